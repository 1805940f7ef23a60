// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Captions single images with the latest checkpoint.
//
//   state.json ──► hyperparameters ──► LoadedModel::init
//                                        │
//   model.mpk.gz ───────────────────────►load_record
//                                        │
//                          shape check vs hyperparameters
//
// Everything is validated before the first image is decoded:
// the stored hyperparameters against the vocabulary on disk,
// then the loaded tensors against the hyperparameters.
//
// Images go through the test-split transform of the profile the
// architecture was trained with (no random crop).

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use serde::Serialize;

use crate::data::{
    dataset::CaptionDataset,
    preprocessor::{ImageProfile, ImageTransform, Split},
};
use crate::domain::{
    bleu::BleuReport,
    error::CaptionError,
    hyperparams::Hyperparameters,
    vocabulary::Vocabulary,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    decoding::{generate, Generation, Termination},
    evaluator::BleuEvaluator,
    model::{Captioner, LoadedModel},
};

/// A decoded caption and the per-step attention behind it.
#[derive(Debug, Clone, Serialize)]
pub struct Captioning {
    pub caption:     String,
    /// Generated words, markers stripped
    pub words:       Vec<String>,
    /// One row per generated token (empty for global models)
    pub attention:   Vec<Vec<f32>>,
    /// Side of the square attention grid
    pub grid_size:   usize,
    pub hit_step_cap: bool,
}

pub struct Inferencer<B: Backend> {
    model:       LoadedModel<B>,
    vocab:       Vocabulary,
    hyperparams: Hyperparameters,
    transform:   ImageTransform,
    device:      B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn from_checkpoint(
        ckpt:   &CheckpointManager,
        vocab:  Vocabulary,
        device: B::Device,
    ) -> Result<Self> {
        let state = ckpt.load_state()?;
        let hyperparams = state.hyperparams;
        hyperparams.validate()?;
        if hyperparams.vocab_size != vocab.len() {
            return Err(CaptionError::incompatible("vocab_size", hyperparams.vocab_size, vocab.len()).into());
        }

        let model = match LoadedModel::<B>::init(&hyperparams, &device) {
            LoadedModel::Global(m)    => LoadedModel::Global(ckpt.load_model(m, &device)?),
            LoadedModel::Attention(m) => LoadedModel::Attention(ckpt.load_model(m, &device)?),
        };
        match &model {
            LoadedModel::Global(m)    => m.ensure_matches(&hyperparams)?,
            LoadedModel::Attention(m) => m.ensure_matches(&hyperparams)?,
        }

        tracing::info!(
            "Loaded {} model from epoch {} (vocab {})",
            model.kind(),
            state.epoch,
            model.vocab_size()
        );

        let transform = ImageTransform::for_profile(ImageProfile::for_kind(hyperparams.kind), Split::Test);
        Ok(Self { model, vocab, hyperparams, transform, device })
    }

    pub fn hyperparams(&self) -> &Hyperparameters {
        &self.hyperparams
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// The test-split transform images must go through.
    pub fn transform(&self) -> ImageTransform {
        self.transform
    }

    /// Corpus BLEU of the loaded model over `dataset`.
    pub fn evaluate(
        &self,
        evaluator:  &BleuEvaluator<'_>,
        dataset:    CaptionDataset,
        batch_size: usize,
    ) -> Result<BleuReport> {
        match &self.model {
            LoadedModel::Global(m)    => evaluator.evaluate_dataset(m, dataset, batch_size, &self.device),
            LoadedModel::Attention(m) => evaluator.evaluate_dataset(m, dataset, batch_size, &self.device),
        }
    }

    /// Greedy-decode a batch of already transformed images.
    pub fn generate(&self, images: Tensor<B, 4>, max_len: usize) -> Result<Vec<Generation>> {
        match &self.model {
            LoadedModel::Global(m)    => generate(m, images, max_len),
            LoadedModel::Attention(m) => generate(m, images, max_len),
        }
    }

    pub fn caption_image(&self, path: &Path, max_len: usize) -> Result<Captioning> {
        let pixels = self
            .transform
            .load(path, 0)
            .with_context(|| format!("Cannot caption '{}'", path.display()))?;
        let side = self.transform.output_size() as usize;
        let images = Tensor::<B, 4>::from_data(TensorData::new(pixels, [1, 3, side, side]), &self.device);

        let generation = self
            .generate(images, max_len)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No caption generated for '{}'", path.display()))?;

        let content: Vec<u32> = generation
            .tokens
            .iter()
            .copied()
            .filter(|&id| !Vocabulary::is_reserved_marker(id))
            .collect();
        let words = self.vocab.strip_reserved(&content);
        tracing::debug!("'{}' → {} tokens", path.display(), generation.tokens.len());

        Ok(Captioning {
            caption:      self.vocab.detokenize(&content),
            words,
            attention:    generation.attention,
            grid_size:    self.hyperparams.grid_size,
            hit_step_cap: generation.termination == Termination::StepCap,
        })
    }
}
