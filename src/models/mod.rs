use std::fmt::Display;

/// The pooled classifier family
pub mod pooled;

pub use pooled::{ClassifierOutput, PooledClassifier, PooledClassifierConfig};

/// The architecture used when none is requested explicitly
pub static DEFAULT_ARCHITECTURE: &str = "pooled-base";

/// The class count used when the experiment config leaves it unset
pub static DEFAULT_NUM_CLASSES: usize = 2;

/// Available architectures
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Architecture {
    /// Small pooled classifier
    PooledSmall,

    /// Base pooled classifier
    PooledBase,
}

impl Architecture {
    /// The pretrained vocabulary this architecture tokenizes with
    pub fn tokenizer(&self) -> &str {
        match self {
            Architecture::PooledSmall | Architecture::PooledBase => "bert-base-uncased",
        }
    }

    /// The token id used for padding
    pub fn pad_token_id(&self) -> usize {
        0
    }

    fn dims(&self) -> (usize, usize) {
        match self {
            Architecture::PooledSmall => (64, 64),
            Architecture::PooledBase => (128, 128),
        }
    }
}

impl TryFrom<&str> for Architecture {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pooled-small" => Ok(Architecture::PooledSmall),
            "pooled-base" => Ok(Architecture::PooledBase),
            _ => Err(ModelError::Unknown(value.to_string())),
        }
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Architecture::PooledSmall => "pooled-small",
            Architecture::PooledBase => "pooled-base",
        };

        write!(f, "{}", name)
    }
}

/// Build the model config for an architecture
///
/// The vocabulary size comes from the tokenizer; the class count defaults
/// when the experiment config leaves it unset.
pub fn select(
    arch: &Architecture,
    vocab_size: usize,
    num_classes: Option<usize>,
) -> PooledClassifierConfig {
    let (embed_dim, hidden_size) = arch.dims();

    PooledClassifierConfig::new(vocab_size)
        .with_embed_dim(embed_dim)
        .with_hidden_size(hidden_size)
        .with_n_classes(num_classes.unwrap_or(DEFAULT_NUM_CLASSES))
        .with_pad_token_id(arch.pad_token_id())
}

/// Model Error
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// No architecture found for the given string
    #[error("no architecture found for {0}")]
    Unknown(String),
}
