// Shared fixtures for the ML unit tests.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use burn::backend::{Autodiff, NdArray};

use crate::data::{dataset::CaptionDataset, preprocessor::ImageTransform};
use crate::domain::{
    hyperparams::{Hyperparameters, ModelKind},
    sample::CaptionSample,
    vocabulary::Vocabulary,
};

pub type TestBackend = NdArray;
pub type TestAutodiffBackend = Autodiff<NdArray>;

/// Tests that seed the backend RNG take this lock first, so two
/// of them never interleave their random draws.
static RNG_LOCK: Mutex<()> = Mutex::new(());

pub fn rng_lock() -> MutexGuard<'static, ()> {
    RNG_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Small enough to run on the CPU backend in milliseconds.
pub fn tiny_hyperparams(kind: ModelKind, vocab_size: usize) -> Hyperparameters {
    let mut h = Hyperparameters::defaults_for(kind, vocab_size);
    h.embed_size    = 6;
    h.hidden_size   = 8;
    h.attention_dim = 5;
    h.encoder_dim   = 4;
    h.decoder_dim   = 8;
    h.grid_size     = 2;
    h.num_epochs    = 2;
    h.learning_rate = 1e-2;
    h
}

/// Write `images` small solid-colour PNGs into `dir` and return a
/// dataset with two captions per image over a tiny vocabulary.
pub fn fixture_dataset(dir: &Path, images: usize, seed: u64) -> (CaptionDataset, Arc<Vocabulary>) {
    let words = ["dog", "cat", "runs", "sleeps", "red", "blue"];
    let mut samples = Vec::new();
    for i in 0..images {
        let id = format!("{i}.png");
        let shade = (i * 40 % 256) as u8;
        image::RgbImage::from_pixel(16, 16, image::Rgb([shade, 255 - shade, 64]))
            .save(dir.join(&id))
            .unwrap();
        samples.push(CaptionSample::new(&id, format!("a {} {}", words[i % 6], words[(i + 2) % 6])));
        samples.push(CaptionSample::new(&id, format!("the {} {} now", words[i % 6], words[(i + 3) % 6])));
    }

    let vocab = Arc::new(Vocabulary::build(samples.iter().map(|s| &s.caption), 1));
    let transform = ImageTransform { resize: 32, crop: None, mean: [0.5; 3], std: [0.5; 3] };
    let dataset = CaptionDataset::new(samples, dir, Arc::clone(&vocab), transform, seed);
    (dataset, vocab)
}
