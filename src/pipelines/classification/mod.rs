use burn::tensor::backend::Backend;
use tokenizers::Tokenizer;

use crate::{
    errors::{Error, Result},
    experiment::ExperimentConfig,
    models::{self, Architecture, PooledClassifier},
};

/// Batcher
pub mod batcher;

/// Ensemble aggregation across seed runs
pub mod ensemble;

/// Single-run loading for inference
pub mod loader;

/// Model output derivation
pub mod output;

/// Prediction records and generation
pub mod probs;

/// Training
pub mod training;

pub use batcher::{Batch, Batcher};
pub use ensemble::{Ensemble, EnsembleManifest};
pub use loader::{load_inputs, load_labels, RunHandle};
pub use output::{ModelOutput, RunStrategy};
pub use probs::PredictionRecord;
pub use training::Trainer;

/// Model, batcher, and tokenizer reconstructed from an experiment config
pub(crate) struct Components<B: Backend> {
    /// The resolved architecture
    pub arch: Architecture,

    /// The tokenizer shared by every batcher of this run
    pub tokenizer: Tokenizer,

    /// Batcher bound to the run's device
    pub batcher: Batcher<B>,

    /// The model, freshly initialized
    pub model: PooledClassifier<B>,
}

/// Build the model and batching strategy an experiment config describes
pub(crate) fn components<B: Backend>(
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<Components<B>> {
    let arch = Architecture::try_from(config.arch.as_str())?;

    let tokenizer = Tokenizer::from_pretrained(arch.tokenizer(), None)
        .map_err(|e| Error::Tokenizer(e.to_string()))?;

    let model = models::select(&arch, tokenizer.get_vocab_size(true), config.num_classes)
        .init(device);

    let batcher = Batcher::new(
        tokenizer.clone(),
        config.max_seq_len,
        arch.pad_token_id(),
        device.clone(),
    );

    Ok(Components {
        arch,
        tokenizer,
        batcher,
        model,
    })
}
