// ============================================================
// Layer 4 — Caption Batcher
// ============================================================
// Implements Burn's Batcher trait: turns a Vec<CaptionItem> into
// one CaptionBatch of tensors on the target device.
//
// Captions have different lengths, so rows are padded with <pad>
// up to the LONGEST caption in this batch (not a global maximum):
//
//   <sos> a   dog  <eos> <pad> <pad>
//   <sos> a   cat  is    asleep <eos>
//
// The loss masks <pad> positions out, so the padding length only
// costs compute, never accuracy.
//
// Items whose image failed to load are dropped here with a
// warning. If nothing survives, the batch is None and the
// training and evaluation loops simply skip it.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::CaptionItem;
use crate::domain::vocabulary::PAD_ID;

// ─── CaptionBatch ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct CaptionBatch<B: Backend> {
    /// [batch, 3, H, W]
    pub images:    Tensor<B, 4>,
    /// [batch, max_len], padded with <pad>
    pub captions:  Tensor<B, 2, Int>,
    /// True (unpadded) length of each row
    pub lengths:   Vec<usize>,
    /// The same token rows, unpadded, for BLEU references
    pub tokens:    Vec<Vec<u32>>,
    pub image_ids: Vec<String>,
}

impl<B: Backend> CaptionBatch<B> {
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

// ─── CaptionBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct CaptionBatcher<B: Backend> {
    pub device:     B::Device,
    /// Side of the square images produced by the dataset's transform
    pub image_size: usize,
}

impl<B: Backend> CaptionBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

/// Right-pad every row with <pad> to the longest row.
/// Returns the flat row-major matrix and the common length.
pub fn pad_sequences(rows: &[Vec<u32>]) -> (Vec<i64>, usize) {
    let max_len = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(rows.len() * max_len);
    for row in rows {
        flat.extend(row.iter().map(|&t| t as i64));
        flat.extend(std::iter::repeat(PAD_ID as i64).take(max_len - row.len()));
    }
    (flat, max_len)
}

impl<B: Backend> Batcher<CaptionItem, Option<CaptionBatch<B>>> for CaptionBatcher<B> {
    fn batch(&self, items: Vec<CaptionItem>) -> Option<CaptionBatch<B>> {
        let expected = 3 * self.image_size * self.image_size;

        let mut pixels    = Vec::with_capacity(items.len() * expected);
        let mut tokens    = Vec::with_capacity(items.len());
        let mut image_ids = Vec::with_capacity(items.len());

        for item in items {
            match item.pixels {
                Some(p) if p.len() == expected => {
                    pixels.extend(p);
                    tokens.push(item.tokens);
                    image_ids.push(item.image_id);
                }
                Some(p) => tracing::warn!(
                    "Dropping '{}': {} pixel values, expected {}",
                    item.image_id,
                    p.len(),
                    expected
                ),
                None => tracing::warn!("Dropping '{}': image unavailable", item.image_id),
            }
        }

        if tokens.is_empty() {
            return None;
        }

        let batch_size = tokens.len();
        let (flat, max_len) = pad_sequences(&tokens);
        let lengths = tokens.iter().map(Vec::len).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, self.image_size, self.image_size]),
            &self.device,
        );
        let captions = Tensor::<B, 2, Int>::from_data(
            TensorData::new(flat, [batch_size, max_len]),
            &self.device,
        );

        Some(CaptionBatch { images, captions, lengths, tokens, image_ids })
    }
}
