use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use burn::{
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::backend::Backend,
};

use crate::{
    datasets,
    errors::{Error, Result},
    experiment::{ExperimentConfig, ExperimentDir, TrainConfig, MODEL_ARGS, TRAIN_ARGS},
};

use super::{
    components,
    output::RunStrategy,
    probs::{self, PredictionRecord},
    training::BASE_WEIGHTS,
    Components,
};

/// A trained run reconstructed from its persisted directory, for
/// inference-only use
///
/// Opening a handle binds the directory and nothing else. Model weights
/// are loaded lazily, on the first prediction request that cannot be
/// served from the cache; runs whose predictions are already cached are
/// never instantiated.
pub struct RunHandle<B: Backend> {
    dir: ExperimentDir,
    device: B::Device,
    strategy: RunStrategy,
    state: Option<Components<B>>,
}

impl<B: Backend> RunHandle<B> {
    /// Bind to a persisted run directory
    pub fn open(root: impl Into<PathBuf>, device: B::Device) -> Result<Self> {
        Ok(Self {
            dir: ExperimentDir::open(root)?,
            device,
            strategy: RunStrategy::Standard,
            state: None,
        })
    }

    /// Select an output strategy other than the standard one
    pub fn with_strategy(mut self, strategy: RunStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The run directory root
    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    /// The probability vectors for (dataset, mode): loaded when cached,
    /// generated and persisted first when not
    pub async fn probs(&mut self, dataset: &str, mode: &str) -> Result<PredictionRecord> {
        if !self.dir.probs_exists(dataset, mode) {
            let record = self.generate_probs(dataset, mode).await?;
            self.dir.save_probs(&record, dataset, mode)?;
        }

        self.dir.load_probs(dataset, mode)
    }

    /// Recompute and overwrite the cached record for (dataset, mode)
    ///
    /// The only path that replaces an existing cache artifact.
    pub async fn regenerate_probs(
        &mut self,
        dataset: &str,
        mode: &str,
    ) -> Result<PredictionRecord> {
        let record = self.generate_probs(dataset, mode).await?;
        self.dir.save_probs(&record, dataset, mode)?;

        self.dir.load_probs(dataset, mode)
    }

    /// Predicted labels derived from the cached probability vectors
    pub async fn predicted_labels(
        &mut self,
        dataset: &str,
        mode: &str,
    ) -> Result<BTreeMap<String, usize>> {
        Ok(self.probs(dataset, mode).await?.predicted_labels())
    }

    async fn generate_probs(&mut self, dataset: &str, mode: &str) -> Result<PredictionRecord> {
        let train_args: TrainConfig = self.dir.load_args(TRAIN_ARGS)?;
        let splits = datasets::load(&train_args.data_dir, dataset).await?;
        let data = splits.mode_data(mode)?;

        let strategy = self.strategy.clone();
        let state = self.state()?;

        probs::generate(&state.model, &strategy, &state.batcher, &data)
    }

    /// Load config and weights on first use; cached reads never get here
    fn state(&mut self) -> Result<&Components<B>> {
        if self.state.is_none() {
            self.state = Some(self.set_up()?);
        }

        Ok(self.state.as_ref().expect("state initialized above"))
    }

    fn set_up(&self) -> Result<Components<B>> {
        let config: ExperimentConfig = self.dir.load_args(MODEL_ARGS)?;

        if !self.dir.has_weights(BASE_WEIGHTS) {
            return Err(Error::WeightsLoad {
                name: BASE_WEIGHTS.to_string(),
                dir: self.dir.root().to_path_buf(),
                reason: "checkpoint file not found".to_string(),
            });
        }

        // a plain (non-autodiff) backend keeps dropout disabled, which is
        // the evaluation mode this handle stays in for its whole life
        let mut comps = components::<B>(&config, &self.device)?;

        let record = CompactRecorder::new()
            .load(self.dir.weights_path(BASE_WEIGHTS), &self.device)
            .map_err(|e| Error::WeightsLoad {
                name: BASE_WEIGHTS.to_string(),
                dir: self.dir.root().to_path_buf(),
                reason: e.to_string(),
            })?;
        comps.model = comps.model.load_record(record);

        Ok(comps)
    }
}

/// Gold labels for a split mode, densely indexed from 0 over the
/// concatenation order
///
/// These positional indices are not the example ids used as cache keys.
pub async fn load_labels(
    data_dir: &str,
    dataset: &str,
    mode: &str,
) -> Result<BTreeMap<usize, i64>> {
    let splits = datasets::load(data_dir, dataset).await?;

    Ok(splits
        .mode_data(mode)?
        .into_iter()
        .enumerate()
        .map(|(k, item)| (k, item.label))
        .collect())
}

/// Raw input text for a split mode, densely indexed from 0 over the
/// concatenation order
pub async fn load_inputs(
    data_dir: &str,
    dataset: &str,
    mode: &str,
) -> Result<BTreeMap<usize, String>> {
    let splits = datasets::load(data_dir, dataset).await?;

    Ok(splits
        .mode_data(mode)?
        .into_iter()
        .enumerate()
        .map(|(k, item)| (k, item.text))
        .collect())
}

#[cfg(test)]
mod tests {
    use burn::backend::{ndarray::NdArrayDevice, NdArray};
    use pretty_assertions::assert_eq;

    use crate::experiment::TrainConfig;

    use super::*;

    type B = NdArray;

    fn fixture(name: &str) -> (PathBuf, String) {
        let root = std::env::temp_dir().join("burn-classify-loader").join(name);
        let _ = std::fs::remove_dir_all(&root);
        let data_dir = root.join("data");

        std::fs::create_dir_all(data_dir.join("toy")).unwrap();
        std::fs::write(
            data_dir.join("toy").join("train.csv"),
            "id,text,label\ntr-0,hello world,0\ntr-1,tiny example,1\n",
        )
        .unwrap();
        std::fs::write(
            data_dir.join("toy").join("dev.csv"),
            "id,text,label\nd-0,hello world,0\nd-1,tiny example,1\n",
        )
        .unwrap();
        std::fs::write(
            data_dir.join("toy").join("test.csv"),
            "id,text,label\ns-0,hello world,1\ns-1,tiny example,0\ns-2,example text,1\n",
        )
        .unwrap();

        (root, data_dir.to_str().unwrap().to_string())
    }

    fn run_dir(root: &Path, data_dir: &str) -> ExperimentDir {
        let dir = ExperimentDir::create(root.join("run")).unwrap();

        dir.save_args(
            MODEL_ARGS,
            &ExperimentConfig::new("pooled-small".to_string()).with_num_classes(Some(2)),
        )
        .unwrap();
        dir.save_args(
            TRAIN_ARGS,
            &TrainConfig::new("toy".to_string()).with_data_dir(data_dir.to_string()),
        )
        .unwrap();

        dir
    }

    #[tokio::test]
    async fn cache_hits_bypass_model_setup() {
        let (root, data_dir) = fixture("cache-hit");
        let dir = run_dir(&root, &data_dir);

        let mut record = PredictionRecord::default();
        record.insert("s-0".to_string(), vec![0.1, 0.9]);
        record.insert("s-1".to_string(), vec![0.8, 0.2]);
        dir.save_probs(&record, "toy", "test").unwrap();

        // no weights exist, so any recomputation attempt would fail
        let mut handle: RunHandle<B> =
            RunHandle::open(root.join("run"), NdArrayDevice::default()).unwrap();

        let first = handle.probs("toy", "test").await.unwrap();
        let second = handle.probs("toy", "test").await.unwrap();

        assert_eq!(first, record);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn predicted_labels_read_from_the_cache() {
        let (root, data_dir) = fixture("labels-from-cache");
        let dir = run_dir(&root, &data_dir);

        let mut record = PredictionRecord::default();
        record.insert("s-0".to_string(), vec![0.1, 0.7, 0.2]);
        record.insert("s-1".to_string(), vec![0.6, 0.3, 0.1]);
        dir.save_probs(&record, "toy", "test").unwrap();

        let mut handle: RunHandle<B> =
            RunHandle::open(root.join("run"), NdArrayDevice::default()).unwrap();
        let labels = handle.predicted_labels("toy", "test").await.unwrap();

        assert_eq!(labels["s-0"], 1);
        assert_eq!(labels["s-1"], 0);
    }

    #[tokio::test]
    async fn missing_weights_fail_the_miss_path() {
        let (root, data_dir) = fixture("missing-weights");
        let _dir = run_dir(&root, &data_dir);

        let mut handle: RunHandle<B> =
            RunHandle::open(root.join("run"), NdArrayDevice::default()).unwrap();
        let result = handle.probs("toy", "test").await;

        assert!(matches!(result, Err(Error::WeightsLoad { .. })));
    }

    #[tokio::test]
    async fn opening_a_missing_run_directory_fails() {
        let result: Result<RunHandle<B>> = RunHandle::open(
            std::env::temp_dir().join("burn-classify-loader-nope"),
            NdArrayDevice::default(),
        );

        assert!(matches!(result, Err(Error::RunDirMissing(_))));
    }

    #[tokio::test]
    async fn compound_modes_are_densely_reindexed() {
        let (_root, data_dir) = fixture("compound-mode");

        let labels = load_labels(&data_dir, "toy", "dev_test").await.unwrap();

        // |dev| = 2, |test| = 3: indices 0..5 with dev first
        let keys: Vec<usize> = labels.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
        assert_eq!(labels[&0], 0);
        assert_eq!(labels[&1], 1);
        assert_eq!(labels[&2], 1);
        assert_eq!(labels[&4], 1);
    }

    #[tokio::test]
    async fn inputs_follow_the_same_indexing() {
        let (_root, data_dir) = fixture("inputs-indexing");

        let inputs = load_inputs(&data_dir, "toy", "test").await.unwrap();

        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[&0], "hello world");
        assert_eq!(inputs[&2], "example text");
    }
}
