use burn::{config::Config, LearningRate};

/// The file name the experiment config is persisted under
pub static MODEL_ARGS: &str = "model_args.json";

/// The file name the training config is persisted under
pub static TRAIN_ARGS: &str = "train_args.json";

/// Model hyperparameters for one experiment
///
/// Persisted once at experiment start and never mutated afterwards: a
/// loaded run must reproduce the exact architecture it was trained with.
#[derive(Config)]
pub struct ExperimentConfig {
    /// The architecture to build (e.g., "pooled-base")
    pub arch: String,

    /// Maximum sequence length
    #[config(default = 128)]
    pub max_seq_len: usize,

    /// The compute device this experiment targets (e.g., "cuda:0")
    ///
    /// Persisted as a label only; the actual binding is passed explicitly
    /// wherever tensors are built.
    #[config(default = "\"cuda:0\".to_string()")]
    pub device: String,

    /// Total number of classes, when the task defines one
    pub num_classes: Option<usize>,
}

/// Training hyperparameters for one training invocation
///
/// Persisted alongside the experiment config but independently versioned:
/// a directory can be retrained with a different `TrainConfig` while
/// keeping the same `ExperimentConfig`.
#[derive(Config)]
pub struct TrainConfig {
    /// The dataset to train on (e.g., "snips")
    pub dataset: String,

    /// Maximum number of epochs
    #[config(default = 12)]
    pub num_epochs: usize,

    /// Batch size
    #[config(default = 8)]
    pub batch_size: usize,

    /// Learning rate
    #[config(default = 1e-5)]
    pub learning_rate: LearningRate,

    /// Emit a training performance snapshot every this many batches
    #[config(default = 100)]
    pub log_every: usize,

    /// On a new best dev epoch, persist weights to the "base" slot; when
    /// false, materialize test-split predictions instead (never both)
    #[config(default = true)]
    pub save_model: bool,

    /// Number of epochs without dev-accuracy improvement tolerated before
    /// stopping
    #[config(default = 3)]
    pub patience: usize,

    /// The location of the top-level data directory
    #[config(default = "\"data\".to_string()")]
    pub data_dir: String,

    /// Truncate every split to this many examples, for smoke runs
    pub limit: Option<usize>,
}
