use burn::{
    nn::attention::generate_padding_mask,
    tensor::{backend::Backend, Bool, Data, ElementConversion, Int, Shape, Tensor},
};
use derive_new::new;
use rand::seq::SliceRandom;
use tokenizers::Tokenizer;

use crate::{
    datasets::Item,
    errors::{Error, Result},
};

/// The reserved label value excluded from loss and accuracy accounting
pub const IGNORE_INDEX: i64 = -100;

/// One unit of work for the model
#[derive(Clone, Debug, new)]
pub struct Batch<B: Backend> {
    /// The example identifiers, in batch order
    pub sample_ids: Vec<String>,

    /// Tokenized text as 2D tensor: [batch_size, seq_length]
    pub tokens: Tensor<B, 2, Int>,

    /// Padding mask for the tokenized text, true at padded positions
    pub mask_pad: Tensor<B, 2, Bool>,

    /// Gold class ids for the batch; `IGNORE_INDEX` marks positions
    /// excluded from loss and accuracy
    pub targets: Tensor<B, 1, Int>,
}

/// Struct for batching classification examples
#[derive(Clone)]
pub struct Batcher<B: Backend> {
    /// Tokenizer for converting text to token IDs
    tokenizer: Tokenizer,

    /// Maximum sequence length for tokenized text
    max_seq_length: usize,

    /// ID of the padding token
    pad_token_id: usize,

    /// Device on which to perform computation (e.g., CPU or CUDA device)
    device: B::Device,
}

impl<B: Backend> Batcher<B> {
    /// Creates a new batcher
    pub fn new(
        tokenizer: Tokenizer,
        max_seq_length: usize,
        pad_token_id: usize,
        device: B::Device,
    ) -> Self {
        Self {
            tokenizer,
            max_seq_length,
            pad_token_id,
            device,
        }
    }

    /// Collect a dataset into batches, optionally shuffling example order
    pub fn batches(
        &self,
        data: &[Item],
        batch_size: usize,
        shuffle: bool,
    ) -> Result<Vec<Batch<B>>> {
        let mut items: Vec<&Item> = data.iter().collect();

        if shuffle {
            items.shuffle(&mut rand::thread_rng());
        }

        items
            .chunks(batch_size.max(1))
            .map(|chunk| self.batch(chunk))
            .collect()
    }

    /// Collects a slice of examples into one batch
    fn batch(&self, items: &[&Item]) -> Result<Batch<B>> {
        let batch_size = items.len();

        let mut sample_ids = Vec::with_capacity(batch_size);
        let mut token_ids_list = Vec::with_capacity(batch_size);

        for item in items {
            let encoding = self
                .tokenizer
                .encode(item.text.as_str(), true)
                .map_err(|e| Error::Tokenizer(e.to_string()))?;

            let mut token_ids: Vec<usize> =
                encoding.get_ids().iter().map(|t| *t as usize).collect();
            token_ids.truncate(self.max_seq_length);

            sample_ids.push(item.id.clone());
            token_ids_list.push(token_ids);
        }

        let padding = generate_padding_mask(
            self.pad_token_id,
            token_ids_list,
            Some(self.max_seq_length),
            &self.device,
        );

        let targets = Tensor::from_data(
            Data::new(
                items.iter().map(|item| item.label.elem()).collect(),
                Shape::new([batch_size]),
            ),
            &self.device,
        );

        Ok(Batch {
            sample_ids,
            tokens: padding.tensor,
            mask_pad: padding.mask,
            targets,
        })
    }
}
