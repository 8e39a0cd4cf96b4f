use burn::tensor::{
    activation, backend::Backend, Data, ElementConversion, Shape, Tensor,
};

use crate::models::{ClassifierOutput, PooledClassifier};

use super::batcher::{Batch, IGNORE_INDEX};

/// The result of running one batch through a model
///
/// Consumed immediately to update running metrics or derive probabilities;
/// never persisted.
#[derive(Debug)]
pub struct ModelOutput<B: Backend> {
    /// Loss over the batch's non-ignored positions
    pub loss: Tensor<B, 1>,

    /// Raw output logits per example
    pub y: Tensor<B, 2>,

    /// Hidden representation per example
    pub h: Tensor<B, 2>,

    /// Positions where the predicted class matches the gold label, among
    /// non-ignored positions
    pub hits: usize,

    /// Count of non-ignored positions in the batch
    pub num_preds: usize,
}

/// How a run derives outputs from the underlying model
///
/// Selected once at construction time, never probed per call.
#[derive(Debug, Clone)]
pub enum RunStrategy {
    /// Plain cross-entropy over the model's logits
    Standard,

    /// Subtract a fixed per-class logit prior before loss and argmax
    BiasAdjusted(Vec<f32>),
}

impl RunStrategy {
    /// Run one batch through the model and derive loss and hit counts
    ///
    /// Targets equal to `IGNORE_INDEX` are excluded from both the loss and
    /// the accuracy accounting.
    pub fn model_output<B: Backend>(
        &self,
        model: &PooledClassifier<B>,
        batch: Batch<B>,
    ) -> ModelOutput<B> {
        let ClassifierOutput { y, h } = model.forward(batch.tokens, batch.mask_pad);

        let y = match self {
            RunStrategy::Standard => y,
            RunStrategy::BiasAdjusted(prior) => adjust(y, prior),
        };

        let targets = batch.targets;
        let [_batch_size, n_classes] = y.dims();

        let keep = targets.clone().not_equal_elem(IGNORE_INDEX);
        let num_preds =
            keep.clone().int().sum().into_scalar().elem::<i64>() as usize;

        // ignored rows are clamped into range for the gather, then zeroed
        let safe_targets = targets.clone().clamp(0i64, n_classes as i64 - 1);
        let picked = activation::log_softmax(y.clone(), 1)
            .gather(1, safe_targets.unsqueeze_dim::<2>(1))
            .squeeze::<1>(1)
            .mask_fill(keep.clone().bool_not(), 0.0);
        let loss = picked.sum().neg().div_scalar(num_preds.max(1) as f32);

        let preds = y.clone().argmax(1).squeeze::<1>(1);
        let hits = preds
            .equal(targets)
            .int()
            .mul(keep.int())
            .sum()
            .into_scalar()
            .elem::<i64>() as usize;

        ModelOutput {
            loss,
            y,
            h,
            hits,
            num_preds,
        }
    }
}

fn adjust<B: Backend>(y: Tensor<B, 2>, prior: &[f32]) -> Tensor<B, 2> {
    let [batch_size, n_classes] = y.dims();
    debug_assert_eq!(prior.len(), n_classes);

    let values: Vec<B::FloatElem> = prior.iter().map(|v| v.elem()).collect();
    let prior = Tensor::<B, 1>::from_data(
        Data::new(values, Shape::new([n_classes])),
        &y.device(),
    );

    y.sub(prior.unsqueeze::<2>().repeat(0, batch_size))
}
