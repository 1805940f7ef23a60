// ============================================================
// Layer 4 — Caption Dataset
// ============================================================
// Implements Burn's Dataset trait over caption samples. The
// DataLoader calls get(i) from its worker threads, so images are
// decoded lazily, one item at a time, never all up front.
//
// A missing or corrupt image does not panic and does not end the
// run: the item comes back with `pixels: None` and the batcher
// drops it.
//
// Random crops are seeded from (seed, epoch, index): the same
// sample gets a fresh crop every epoch, and worker scheduling
// never changes which crop that is. Burn's `get(i)` reads epoch 0.

use std::{path::PathBuf, sync::Arc};

use burn::data::dataset::Dataset;

use crate::data::preprocessor::ImageTransform;
use crate::domain::{sample::CaptionSample, vocabulary::Vocabulary};

/// One decoded sample.
#[derive(Debug, Clone)]
pub struct CaptionItem {
    pub image_id: String,
    /// <sos> caption <eos>
    pub tokens:   Vec<u32>,
    /// CHW floats, None when the image failed to load
    pub pixels:   Option<Vec<f32>>,
}

pub struct CaptionDataset {
    samples:   Vec<CaptionSample>,
    image_dir: PathBuf,
    vocab:     Arc<Vocabulary>,
    transform: ImageTransform,
    seed:      u64,
}

impl CaptionDataset {
    pub fn new(
        samples:   Vec<CaptionSample>,
        image_dir: impl Into<PathBuf>,
        vocab:     Arc<Vocabulary>,
        transform: ImageTransform,
        seed:      u64,
    ) -> Self {
        Self { samples, image_dir: image_dir.into(), vocab, transform, seed }
    }

    pub fn samples(&self) -> &[CaptionSample] {
        &self.samples
    }

    pub fn transform(&self) -> &ImageTransform {
        &self.transform
    }

    /// Decode sample `index` as seen during `epoch`.
    pub fn get_in_epoch(&self, index: usize, epoch: usize) -> Option<CaptionItem> {
        let sample = self.samples.get(index)?;
        let path   = self.image_dir.join(&sample.image_id);

        let crop_seed = self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (epoch as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93)
            ^ index as u64;

        let pixels = match self.transform.load(&path, crop_seed) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("Skipping sample {} ('{}'): {:#}", index, sample.image_id, e);
                None
            }
        };

        Some(CaptionItem {
            image_id: sample.image_id.clone(),
            tokens:   self.vocab.encode_caption(&sample.caption),
            pixels,
        })
    }
}

impl Dataset<CaptionItem> for CaptionDataset {
    fn get(&self, index: usize) -> Option<CaptionItem> {
        self.get_in_epoch(index, 0)
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vocabulary::{END_ID, START_ID};

    fn fixture() -> (tempfile::TempDir, CaptionDataset) {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::from_pixel(10, 10, image::Rgb([10, 20, 30]))
            .save(dir.path().join("ok.png"))
            .unwrap();

        let samples = vec![
            CaptionSample::new("ok.png", "a red square"),
            CaptionSample::new("missing.png", "nothing here"),
        ];
        let vocab = Arc::new(Vocabulary::build(samples.iter().map(|s| &s.caption), 1));
        let transform = ImageTransform { resize: 8, crop: Some(4), mean: [0.5; 3], std: [0.5; 3] };
        let ds = CaptionDataset::new(samples, dir.path(), vocab, transform, 211);
        (dir, ds)
    }

    #[test]
    fn test_get_encodes_caption_and_pixels() {
        let (_dir, ds) = fixture();
        let item = ds.get(0).unwrap();
        assert_eq!(item.image_id, "ok.png");
        assert_eq!(item.tokens.first(), Some(&START_ID));
        assert_eq!(item.tokens.last(), Some(&END_ID));
        assert_eq!(item.tokens.len(), 5);
        assert_eq!(item.pixels.unwrap().len(), 3 * 4 * 4);
    }

    #[test]
    fn test_missing_image_is_reported_not_fatal() {
        let (_dir, ds) = fixture();
        let item = ds.get(1).unwrap();
        assert!(item.pixels.is_none());
        assert!(ds.get(2).is_none());
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_same_index_yields_same_pixels() {
        let (_dir, ds) = fixture();
        assert_eq!(ds.get(0).unwrap().pixels, ds.get(0).unwrap().pixels);
        assert_eq!(ds.get_in_epoch(0, 3).unwrap().pixels, ds.get_in_epoch(0, 3).unwrap().pixels);
    }

    #[test]
    fn test_crop_changes_between_epochs() {
        let dir = tempfile::tempdir().unwrap();
        // Gradient image: every crop offset gives different pixels
        image::RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 16) as u8, (y * 16) as u8, 0]))
            .save(dir.path().join("grad.png"))
            .unwrap();
        let samples = vec![CaptionSample::new("grad.png", "a gradient")];
        let vocab = Arc::new(Vocabulary::build(samples.iter().map(|s| &s.caption), 1));
        let transform = ImageTransform { resize: 16, crop: Some(4), mean: [0.5; 3], std: [0.5; 3] };
        let ds = CaptionDataset::new(samples, dir.path(), vocab, transform, 211);

        let crops: std::collections::HashSet<Vec<u32>> = (1..=8)
            .map(|epoch| {
                let pixels = ds.get_in_epoch(0, epoch).unwrap().pixels.unwrap();
                pixels.iter().map(|p| p.to_bits()).collect()
            })
            .collect();
        assert!(crops.len() > 1, "every epoch produced the same crop");
    }
}
