/// Experiment and training configs
pub mod config;

/// The experiment run directory
pub mod dir;

/// Running loss and accuracy metrics
pub mod metrics;

pub use config::{ExperimentConfig, TrainConfig, MODEL_ARGS, TRAIN_ARGS};
pub use dir::ExperimentDir;
pub use metrics::Perf;
