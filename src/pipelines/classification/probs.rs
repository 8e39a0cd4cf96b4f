use std::collections::BTreeMap;

use burn::tensor::{activation, backend::Backend};
use serde::{Deserialize, Serialize};

use crate::{datasets::Item, errors::Result, models::PooledClassifier};

use super::{batcher::Batcher, output::RunStrategy};

/// Per-example probability vectors for one (dataset, split) pair
///
/// Keyed by example id. Entries are full distributions when the task has
/// more than one class, and bare length-1 vectors in the scalar case.
/// Once persisted for a run, a record is treated as immutable: the cache
/// never recomputes it unless explicitly regenerated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord(BTreeMap<String, Vec<f32>>);

impl PredictionRecord {
    /// Add the probability vector for one example
    pub fn insert(&mut self, id: String, probs: Vec<f32>) {
        self.0.insert(id, probs);
    }

    /// The probability vector for one example
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.0.get(id).map(|probs| probs.as_slice())
    }

    /// The example ids covered by this record, in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|id| id.as_str())
    }

    /// Iterate over (id, probability vector) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<f32>)> {
        self.0.iter()
    }

    /// Number of examples covered
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record covers no examples
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether two records cover the identical example-id set
    pub fn ids_match(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.keys().zip(other.0.keys()).all(|(a, b)| a == b)
    }

    /// Predicted labels: the argmax of each example's probability vector
    pub fn predicted_labels(&self) -> BTreeMap<String, usize> {
        self.0
            .iter()
            .map(|(id, probs)| (id.clone(), argmax(probs)))
            .collect()
    }

    /// Elementwise arithmetic mean across records, per example id
    ///
    /// Coverage must already be verified: ids absent from a record simply
    /// do not contribute.
    pub fn mean(records: &[Self]) -> Self {
        let mut out = Self::default();

        let Some(first) = records.first() else {
            return out;
        };

        for (id, probs) in &first.0 {
            let mut sum = vec![0.0f32; probs.len()];

            for record in records {
                if let Some(other) = record.0.get(id) {
                    for (s, v) in sum.iter_mut().zip(other) {
                        *s += v;
                    }
                }
            }

            let n = records.len() as f32;
            out.0.insert(id.clone(), sum.into_iter().map(|s| s / n).collect());
        }

        out
    }
}

/// Index of the largest probability (first one, on ties)
pub fn argmax(probs: &[f32]) -> usize {
    let mut best = 0;

    for (i, &p) in probs.iter().enumerate() {
        if p > probs[best] {
            best = i;
        }
    }

    best
}

/// Run inference over every example and collect one probability vector each
///
/// Examples are processed one at a time, in dataset order. Output vectors
/// with more than one entry are softmax-normalized; bare scalars pass
/// through unchanged.
pub fn generate<B: Backend>(
    model: &PooledClassifier<B>,
    strategy: &RunStrategy,
    batcher: &Batcher<B>,
    data: &[Item],
) -> Result<PredictionRecord> {
    let mut record = PredictionRecord::default();

    for batch in batcher.batches(data, 1, false)? {
        let sample_id = batch.sample_ids[0].clone();
        let output = strategy.model_output(model, batch);

        let y = output.y.squeeze::<1>(0);
        let y = if y.dims()[0] > 1 {
            activation::softmax(y, 0)
        } else {
            y
        };

        record.insert(sample_id, y.into_data().convert::<f32>().value);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use burn::backend::{ndarray::NdArrayDevice, NdArray};
    use pretty_assertions::assert_eq;

    use crate::models::PooledClassifierConfig;
    use crate::pipelines::classification::batcher::tests::{items, word_tokenizer};

    use super::*;

    type B = NdArray;

    fn record(entries: &[(&str, &[f32])]) -> PredictionRecord {
        let mut record = PredictionRecord::default();

        for (id, probs) in entries {
            record.insert(id.to_string(), probs.to_vec());
        }

        record
    }

    #[test]
    fn argmax_picks_the_largest_entry() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.9]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn predicted_labels_derive_from_argmax() {
        let record = record(&[("e-0", &[0.1, 0.7, 0.2]), ("e-1", &[0.6, 0.3, 0.1])]);

        let labels = record.predicted_labels();
        assert_eq!(labels["e-0"], 1);
        assert_eq!(labels["e-1"], 0);
    }

    #[test]
    fn mean_averages_elementwise_per_id() {
        let a = record(&[("e-0", &[0.2, 0.8])]);
        let b = record(&[("e-0", &[0.6, 0.4])]);

        let mean = PredictionRecord::mean(&[a, b]);

        let probs = mean.get("e-0").unwrap();
        assert!((probs[0] - 0.4).abs() < 1e-6);
        assert!((probs[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn ids_match_compares_full_key_sets() {
        let a = record(&[("1", &[1.0]), ("2", &[1.0]), ("3", &[1.0])]);
        let b = record(&[("1", &[1.0]), ("2", &[1.0])]);
        let c = record(&[("1", &[0.5]), ("2", &[0.5]), ("3", &[0.5])]);

        assert!(!a.ids_match(&b));
        assert!(!b.ids_match(&a));
        assert!(a.ids_match(&c));
    }

    #[test]
    fn generated_distributions_sum_to_one() {
        let device = NdArrayDevice::default();
        let model = PooledClassifierConfig::new(16)
            .with_embed_dim(8)
            .with_hidden_size(8)
            .with_n_classes(3)
            .init::<B>(&device);
        let batcher = Batcher::new(word_tokenizer(), 8, 0, device);

        let data = items(&[0, 1, 2]);
        let record =
            generate(&model, &RunStrategy::Standard, &batcher, &data).unwrap();

        assert_eq!(record.len(), 3);

        let expected: Vec<&str> = data.iter().map(|item| item.id.as_str()).collect();
        let mut got: Vec<&str> = record.ids().collect();
        got.sort();
        assert_eq!(got, expected);

        for (_, probs) in record.iter() {
            let total: f32 = probs.iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "sum was {}", total);
        }
    }

    #[test]
    fn scalar_outputs_pass_through_unnormalized() {
        let device = NdArrayDevice::default();
        let model = PooledClassifierConfig::new(16)
            .with_embed_dim(8)
            .with_hidden_size(8)
            .with_n_classes(1)
            .init::<B>(&device);
        let batcher = Batcher::new(word_tokenizer(), 8, 0, device);

        let record =
            generate(&model, &RunStrategy::Standard, &batcher, &items(&[0, 0])).unwrap();

        for (_, probs) in record.iter() {
            assert_eq!(probs.len(), 1);
            assert!(probs[0].is_finite());
        }
    }
}
