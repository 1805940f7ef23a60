// ============================================================
// Layer 2 — CaptionUseCase
// ============================================================
// Captions one image with the latest checkpoint. Optionally
// writes the per-step attention weights as JSON, ready for an
// external tool to draw heatmaps from:
//
//   { "caption": "...", "words": [...],
//     "attention": [[p_0 .. p_{g²-1}], ...],   one row per token
//     "grid_size": g, "hit_step_cap": false }

use std::{fs, path::Path};

use anyhow::{Context, Result};
use burn::prelude::Backend;

use crate::application::device::{ComputeDevice, CpuBackend, WgpuBackend};
use crate::infra::{checkpoint::CheckpointManager, vocab_store::VocabStore};
use crate::ml::inferencer::{Captioning, Inferencer};

#[derive(Debug, Clone)]
pub struct CaptionConfig {
    pub checkpoint_dir: String,
    pub image:          String,
    pub device:         ComputeDevice,
    pub max_len:        usize,
    /// Where to dump the attention JSON, if anywhere
    pub attention_out:  Option<String>,
}

pub struct CaptionUseCase {
    config: CaptionConfig,
}

impl CaptionUseCase {
    pub fn new(config: CaptionConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Captioning> {
        match self.config.device {
            ComputeDevice::Wgpu => self.caption_on::<WgpuBackend>(ComputeDevice::wgpu()),
            ComputeDevice::Cpu  => self.caption_on::<CpuBackend>(ComputeDevice::cpu()),
        }
    }

    fn caption_on<B: Backend>(&self, device: B::Device) -> Result<Captioning> {
        let cfg   = &self.config;
        let ckpt  = CheckpointManager::new(&cfg.checkpoint_dir)?;
        let vocab = VocabStore::new(&cfg.checkpoint_dir).load()?;

        let inferencer = Inferencer::<B>::from_checkpoint(&ckpt, vocab, device)?;
        let captioning = inferencer.caption_image(Path::new(&cfg.image), cfg.max_len)?;

        if captioning.hit_step_cap {
            tracing::warn!("Caption for '{}' stopped at {} tokens", cfg.image, cfg.max_len);
        }
        if let Some(out) = &cfg.attention_out {
            if captioning.attention.is_empty() {
                tracing::warn!("The {} model has no attention weights to write", inferencer.hyperparams().kind);
            }
            fs::write(out, serde_json::to_string_pretty(&captioning)?)
                .with_context(|| format!("Cannot write attention to '{out}'"))?;
            tracing::info!("Attention weights written to '{}'", out);
        }

        Ok(captioning)
    }
}
