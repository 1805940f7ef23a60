// ============================================================
// Layer 4 — Ordered Epoch Loader
// ============================================================
// Feeds the training loop one epoch of batches at a time, with a
// worker pool decoding images ahead of the model.
//
// Burn's multi-threaded DataLoader hands batches over in whatever
// order its workers finish them, and Adam updates depend on that
// order. This loader keeps the order fixed:
//
//   order    = permutation of 0..len, seeded by (seed, epoch)
//   batch j  = order[j*bs .. (j+1)*bs]
//   worker w decodes batches w, w+N, w+2N, ... into its own
//            bounded channel
//   consumer receives batch j from worker j % N
//
// Batch contents and batch order are a pure function of
// (seed, epoch), whatever the worker count. Each worker runs at
// most PREFETCH batches ahead. Dropping the iterator mid-epoch
// closes the channels and joins the workers.
//
// The epoch is also passed to the dataset, so random crops change
// from one epoch to the next and a resumed run sees the same
// crops as an uninterrupted one.
//
// Reference: Burn DataLoader (multithread.rs) for the worker /
//            channel layout

use std::{
    sync::{
        mpsc::{sync_channel, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
};

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::{
    batcher::{CaptionBatch, CaptionBatcher},
    dataset::{CaptionDataset, CaptionItem},
};

/// Batches each worker may decode ahead of the consumer.
const PREFETCH: usize = 2;

pub struct EpochLoader<B: Backend> {
    dataset:     Arc<CaptionDataset>,
    batcher:     CaptionBatcher<B>,
    batch_size:  usize,
    num_workers: usize,
    seed:        u64,
}

impl<B: Backend> EpochLoader<B> {
    pub fn new(
        dataset:     Arc<CaptionDataset>,
        batcher:     CaptionBatcher<B>,
        batch_size:  usize,
        num_workers: usize,
        seed:        u64,
    ) -> Self {
        Self {
            dataset,
            batcher,
            batch_size:  batch_size.max(1),
            num_workers: num_workers.max(1),
            seed,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.samples().len().div_ceil(self.batch_size)
    }

    /// Sample indices in the order `epoch` visits them.
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.samples().len()).collect();
        let mut rng = StdRng::seed_from_u64(epoch_seed(self.seed, epoch));
        order.shuffle(&mut rng);
        order
    }

    /// Start the workers for `epoch`. Batches whose every image
    /// failed to load come through as None.
    pub fn epoch(&self, epoch: usize) -> EpochBatches<B> {
        let order   = Arc::new(self.order(epoch));
        let batches = self.num_batches();
        let workers = self.num_workers.min(batches.max(1));

        let mut receivers = Vec::with_capacity(workers);
        let mut handles   = Vec::with_capacity(workers);

        for w in 0..workers {
            let (tx, rx) = sync_channel::<Vec<CaptionItem>>(PREFETCH);
            let dataset    = Arc::clone(&self.dataset);
            let order      = Arc::clone(&order);
            let batch_size = self.batch_size;

            handles.push(thread::spawn(move || {
                for j in (w..batches).step_by(workers) {
                    let end = ((j + 1) * batch_size).min(order.len());
                    let items: Vec<CaptionItem> = order[j * batch_size..end]
                        .iter()
                        .filter_map(|&i| dataset.get_in_epoch(i, epoch))
                        .collect();
                    // The consumer is gone; stop quietly
                    if tx.send(items).is_err() {
                        return;
                    }
                }
            }));
            receivers.push(rx);
        }

        tracing::debug!("Epoch {}: {} batches over {} workers", epoch, batches, workers);
        EpochBatches {
            receivers,
            handles,
            batcher: self.batcher.clone(),
            next:    0,
            total:   batches,
        }
    }
}

/// Iterator over one epoch's batches, in order.
pub struct EpochBatches<B: Backend> {
    receivers: Vec<Receiver<Vec<CaptionItem>>>,
    handles:   Vec<JoinHandle<()>>,
    batcher:   CaptionBatcher<B>,
    next:      usize,
    total:     usize,
}

impl<B: Backend> Iterator for EpochBatches<B> {
    type Item = Option<CaptionBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total || self.receivers.is_empty() {
            return None;
        }
        let worker = self.next % self.receivers.len();
        self.next += 1;

        match self.receivers[worker].recv() {
            Ok(items) => Some(self.batcher.batch(items)),
            Err(_) => {
                tracing::warn!("Loader worker {} stopped early, ending the epoch", worker);
                self.next = self.total;
                None
            }
        }
    }
}

impl<B: Backend> Drop for EpochBatches<B> {
    fn drop(&mut self) {
        // Closing the receivers unblocks any worker stuck on send
        self.receivers.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("A loader worker panicked");
            }
        }
    }
}

fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (epoch as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::data::preprocessor::ImageTransform;
    use crate::domain::{sample::CaptionSample, vocabulary::Vocabulary};

    type TestBackend = NdArray;

    fn loader(dir: &std::path::Path, workers: usize) -> EpochLoader<TestBackend> {
        let mut samples = Vec::new();
        for i in 0..7 {
            let id = format!("{i}.png");
            image::RgbImage::from_pixel(12, 12, image::Rgb([i as u8 * 30, 40, 50]))
                .save(dir.join(&id))
                .unwrap();
            samples.push(CaptionSample::new(&id, format!("caption number {i}")));
        }
        let vocab = Arc::new(Vocabulary::build(samples.iter().map(|s| &s.caption), 1));
        let transform = ImageTransform { resize: 10, crop: Some(8), mean: [0.5; 3], std: [0.5; 3] };
        let dataset = Arc::new(CaptionDataset::new(samples, dir, vocab, transform, 3));
        EpochLoader::new(dataset, CaptionBatcher::new(Default::default(), 8), 2, workers, 3)
    }

    fn epoch_ids(loader: &EpochLoader<TestBackend>, epoch: usize) -> Vec<Vec<String>> {
        loader.epoch(epoch).flatten().map(|b| b.image_ids).collect()
    }

    #[test]
    fn test_worker_count_does_not_change_batches() {
        let dir = tempfile::tempdir().unwrap();
        let single = epoch_ids(&loader(dir.path(), 1), 1);
        let pooled = epoch_ids(&loader(dir.path(), 3), 1);
        assert_eq!(single.len(), 4);
        assert_eq!(single, pooled);
    }

    #[test]
    fn test_worker_count_does_not_change_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = |workers| -> Vec<Vec<f32>> {
            loader(dir.path(), workers)
                .epoch(2)
                .flatten()
                .map(|b| b.images.into_data().convert::<f32>().to_vec::<f32>().unwrap())
                .collect()
        };
        assert_eq!(pixels(1), pixels(4));
    }

    #[test]
    fn test_every_sample_once_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen: Vec<String> = epoch_ids(&loader(dir.path(), 2), 1).concat();
        seen.sort();
        let expected: Vec<String> = (0..7).map(|i| format!("{i}.png")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_epochs_reshuffle() {
        let dir = tempfile::tempdir().unwrap();
        let l = loader(dir.path(), 2);
        assert_eq!(l.order(1), l.order(1));
        assert_ne!(l.order(1), l.order(2));
    }

    #[test]
    fn test_dropping_mid_epoch_returns() {
        let dir = tempfile::tempdir().unwrap();
        let l = loader(dir.path(), 3);
        let mut batches = l.epoch(1);
        assert!(batches.next().is_some());
        drop(batches);
        assert_eq!(epoch_ids(&l, 1).len(), 4);
    }
}
