use std::path::PathBuf;

/// Errors raised while orchestrating an experiment run
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The run directory does not exist on disk
    #[error("run directory not found: {}", .0.display())]
    RunDirMissing(PathBuf),

    /// A persisted config file is missing or malformed
    #[error("unable to load config {name} from {}: {reason}", dir.display())]
    ConfigLoad {
        /// The config file name (e.g., "model_args.json")
        name: String,
        /// The run directory the config was expected in
        dir: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A persisted checkpoint is missing or shape-incompatible
    #[error("unable to load weights {name} from {}: {reason}", dir.display())]
    WeightsLoad {
        /// The checkpoint slot name (e.g., "base")
        name: String,
        /// The run directory the checkpoint was expected in
        dir: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A checkpoint could not be persisted
    #[error("unable to save weights {name} to {}: {reason}", dir.display())]
    WeightsSave {
        /// The checkpoint slot name
        name: String,
        /// The run directory the checkpoint was written to
        dir: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Ensemble seeds disagree on example-id coverage
    #[error("ensemble seed {seed} does not cover the same example ids as {reference}")]
    Consistency {
        /// The seed whose id set diverged
        seed: String,
        /// The seed used as the reference id set
        reference: String,
    },

    /// A prediction record could not be persisted
    #[error("unable to write predictions for {dataset}/{mode}: {reason}")]
    CacheWrite {
        /// The dataset the predictions were generated for
        dataset: String,
        /// The split mode the predictions were generated for
        mode: String,
        /// What went wrong
        reason: String,
    },

    /// A caller-supplied argument is out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The tokenizer could not be constructed or failed to encode
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// No architecture found for the requested name
    #[error(transparent)]
    Model(#[from] crate::models::ModelError),

    /// A dataset could not be read or a split mode was not recognized
    #[error(transparent)]
    Dataset(#[from] crate::datasets::DatasetError),

    /// An underlying filesystem operation failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results produced by this crate
pub type Result<T> = std::result::Result<T, Error>;
