// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores the latest checkpoint on the held-out images:
//
//   Step 1: Reload train_config.json      (Layer 6 - infra)
//   Step 2: Rebuild the same split        (Layer 4 - data)
//   Step 3: Load vocabulary + checkpoint  (Layer 5/6)
//   Step 4: Corpus BLEU on the test split (Layer 5 - ml)
//   Step 5: Write bleu_report.json        (Layer 6 - infra)
//
// The split is reproduced from the stored seed and test
// fraction, so no test image was seen in training.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};

use crate::application::{
    device::{ComputeDevice, CpuBackend, WgpuBackend},
    train_use_case::TrainConfig,
};
use crate::data::{
    dataset::CaptionDataset,
    loader::{CaptionTable, CsvCaptionLoader},
    splitter::split_by_image,
};
use crate::domain::{bleu::BleuReport, hyperparams::ModelKind, traits::CaptionSource};
use crate::infra::{checkpoint::CheckpointManager, vocab_store::VocabStore};
use crate::ml::{
    evaluator::{BleuEvaluator, ReferencePolicy},
    inferencer::Inferencer,
};

pub const REPORT_FILE: &str = "bleu_report.json";

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub checkpoint_dir: String,
    pub device:         ComputeDevice,
    pub policy:         ReferencePolicy,
    pub batch_size:     usize,
    pub max_batches:    Option<usize>,
    pub max_len:        usize,
}

/// What ends up in bleu_report.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model:  ModelKind,
    pub epoch:  usize,
    pub policy: ReferencePolicy,
    #[serde(flatten)]
    pub bleu:   BleuReport,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        match self.config.device {
            ComputeDevice::Wgpu => self.evaluate_on::<WgpuBackend>(ComputeDevice::wgpu()),
            ComputeDevice::Cpu  => self.evaluate_on::<CpuBackend>(ComputeDevice::cpu()),
        }
    }

    fn evaluate_on<B: Backend>(&self, device: B::Device) -> Result<EvaluationReport> {
        let cfg  = &self.config;
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;

        // ── Step 1: Training config ───────────────────────────────────────────
        let train_cfg: TrainConfig = ckpt.load_config()?;

        // ── Step 2: Same split as training ────────────────────────────────────
        let samples = CsvCaptionLoader::new(&train_cfg.captions_file).load_all()?;
        let table   = CaptionTable::from_samples(&samples);
        let (_, test) = split_by_image(samples, train_cfg.test_fraction, train_cfg.seed);
        tracing::info!(
            "Evaluating on {} test captions ({} images captioned in total)",
            test.len(),
            table.image_count()
        );

        // ── Step 3: Vocabulary + model ────────────────────────────────────────
        let vocab = VocabStore::new(&cfg.checkpoint_dir).load()?;
        let inferencer = Inferencer::<B>::from_checkpoint(&ckpt, vocab, device)?;
        let state = ckpt.load_state()?;

        let dataset = CaptionDataset::new(
            test,
            &train_cfg.images_dir,
            Arc::new(inferencer.vocab().clone()),
            inferencer.transform(),
            train_cfg.seed,
        );

        // ── Step 4: BLEU ──────────────────────────────────────────────────────
        let evaluator = BleuEvaluator::new(inferencer.vocab(), cfg.max_len).with_max_batches(cfg.max_batches);
        let evaluator = match cfg.policy {
            ReferencePolicy::Single => evaluator,
            ReferencePolicy::Multi  => evaluator.with_references(&table),
        };
        let bleu = inferencer.evaluate(&evaluator, dataset, cfg.batch_size)?;

        // ── Step 5: Report ────────────────────────────────────────────────────
        let report = EvaluationReport {
            model:  inferencer.hyperparams().kind,
            epoch:  state.epoch,
            policy: cfg.policy,
            bleu,
        };
        let path = PathBuf::from(&cfg.checkpoint_dir).join(REPORT_FILE);
        fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::info!("BLEU report written to '{}'", path.display());

        Ok(report)
    }
}
