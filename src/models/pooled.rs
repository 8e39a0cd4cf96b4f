use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig},
    tensor::{activation, backend::Backend, Bool, Int, Tensor},
};
use derive_new::new;

/// Configuration for the pooled classifier
#[derive(Config)]
pub struct PooledClassifierConfig {
    /// Vocabulary size of the token embedding
    pub vocab_size: usize,

    /// Token embedding width
    #[config(default = 128)]
    pub embed_dim: usize,

    /// Width of the hidden representation
    #[config(default = 128)]
    pub hidden_size: usize,

    /// Total number of classes
    #[config(default = 2)]
    pub n_classes: usize,

    /// The padding token ID
    #[config(default = 0)]
    pub pad_token_id: usize,

    /// Dropout rate applied before the output layer
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl PooledClassifierConfig {
    /// Initialize the model on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> PooledClassifier<B> {
        PooledClassifier {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embed_dim).init(device),
            hidden: LinearConfig::new(self.embed_dim, self.hidden_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(self.hidden_size, self.n_classes).init(device),
            embed_dim: self.embed_dim,
        }
    }
}

/// The result of one forward pass
#[derive(Debug, new)]
pub struct ClassifierOutput<B: Backend> {
    /// Raw output logits per example
    pub y: Tensor<B, 2>,

    /// Hidden representation per example
    pub h: Tensor<B, 2>,
}

/// A sequence classifier over mean-pooled token embeddings
///
/// Deliberately small: the experiment orchestration around it is the
/// subject of this crate, and anything exposing `forward(ids, mask)` with
/// logits and a hidden state can stand in for it.
#[derive(Module, Debug)]
pub struct PooledClassifier<B: Backend> {
    /// Token embedding table
    pub embedding: Embedding<B>,

    /// Projection from pooled embedding to hidden representation
    pub hidden: Linear<B>,

    /// Dropout before the output layer
    pub dropout: Dropout,

    /// Linear layer producing class logits
    pub output: Linear<B>,

    /// Token embedding width
    pub embed_dim: usize,
}

impl<B: Backend> PooledClassifier<B> {
    /// Perform a forward pass
    ///
    /// `mask_pad` is true at padded positions; padded embeddings are
    /// excluded from the mean pool.
    pub fn forward(
        &self,
        tokens: Tensor<B, 2, Int>,
        mask_pad: Tensor<B, 2, Bool>,
    ) -> ClassifierOutput<B> {
        let [_batch_size, _seq_length] = tokens.dims();

        let embedded = self.embedding.forward(tokens);

        let keep = mask_pad.bool_not().float();
        let counts = keep
            .clone()
            .sum_dim(1)
            .clamp_min(1.0)
            .repeat(1, self.embed_dim);
        let weights = keep.unsqueeze_dim::<3>(2).repeat(2, self.embed_dim);

        let pooled = embedded.mul(weights).sum_dim(1).squeeze::<2>(1).div(counts);

        let h = activation::gelu(self.hidden.forward(pooled));
        let y = self.output.forward(self.dropout.forward(h.clone()));

        ClassifierOutput { y, h }
    }
}
