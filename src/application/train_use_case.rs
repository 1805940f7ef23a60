// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 0: Resume guard                  (Layer 6 - infra)
//   Step 1: Load the caption table        (Layer 4 - data)
//   Step 2: Image-disjoint train/test     (Layer 4 - data)
//   Step 3: Build / load vocabulary       (Layer 6 - infra)
//   Step 4: Resolve hyperparameters       (Layer 3 - domain)
//   Step 5: Build the training dataset    (Layer 4 - data)
//   Step 6: Save config                   (Layer 6 - infra)
//   Step 7: Run training loop             (Layer 5 - ml)
//
// The vocabulary is built from the training split only, and
// reused as-is when tokenizer.json already exists (resume).
// train_config.json lets `evaluate` rebuild the exact same split,
// so a resumed run must keep the fields that decide the split.
//
// Reference: Burn Book §5 (Training)

use std::sync::Arc;

use anyhow::{Context, Result};
use burn::{backend::Autodiff, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::application::device::{ComputeDevice, CpuBackend, WgpuBackend};
use crate::data::{
    dataset::CaptionDataset,
    loader::CsvCaptionLoader,
    preprocessor::{ImageProfile, ImageTransform, Split},
    splitter::split_by_image,
};
use crate::domain::{
    error::CaptionError,
    hyperparams::{Hyperparameters, ModelKind},
    traits::CaptionSource,
};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger, vocab_store::VocabStore};
use crate::ml::{
    context::ExecutionContext,
    model::{ShowAttendTellConfig, ShowTellConfig},
    trainer::{run_training, TrainingPlan, TrainingReport, TrainingSinks},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a training run needs besides the data itself.
// Serialisable so evaluation can reload it and rebuild the split.
// Optional fields override the per-architecture defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub captions_file:    String,
    pub images_dir:       String,
    pub checkpoint_dir:   String,
    pub model:            ModelKind,
    pub device:           ComputeDevice,
    pub batch_size:       usize,
    pub num_workers:      usize,
    pub epochs:           Option<usize>,
    pub learning_rate:    Option<f64>,
    pub freq_threshold:   usize,
    pub test_fraction:    f64,
    pub seed:             u64,
    pub train_encoder:    bool,
    pub resume:           bool,
    pub save_checkpoints: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            captions_file:    "data/captions.txt".to_string(),
            images_dir:       "data/Images".to_string(),
            checkpoint_dir:   "checkpoints".to_string(),
            model:            ModelKind::Attention,
            device:           ComputeDevice::Wgpu,
            batch_size:       32,
            num_workers:      4,
            epochs:           None,
            learning_rate:    None,
            freq_threshold:   5,
            test_fraction:    0.1,
            seed:             211,
            train_encoder:    true,
            resume:           false,
            save_checkpoints: true,
        }
    }
}

impl TrainConfig {
    /// Architecture defaults for `vocab_size`, with this config's overrides.
    pub fn hyperparams(&self, vocab_size: usize) -> Hyperparameters {
        let mut h = Hyperparameters::defaults_for(self.model, vocab_size);
        if let Some(epochs) = self.epochs {
            h.num_epochs = epochs;
        }
        if let Some(lr) = self.learning_rate {
            h.learning_rate = lr;
        }
        h.train_encoder = self.train_encoder;
        h
    }

    /// A resumed run must split the table exactly as the stored run
    /// (`stored`) did, or training images leak into the test set.
    pub fn ensure_same_split(&self, stored: &TrainConfig) -> Result<(), CaptionError> {
        if self.captions_file != stored.captions_file {
            return Err(CaptionError::incompatible(
                "captions_file",
                &stored.captions_file,
                &self.captions_file,
            ));
        }
        if self.seed != stored.seed {
            return Err(CaptionError::incompatible("seed", stored.seed, self.seed));
        }
        if self.test_fraction != stored.test_fraction {
            return Err(CaptionError::incompatible(
                "test_fraction",
                stored.test_fraction,
                self.test_fraction,
            ));
        }
        Ok(())
    }
}

/// Refuse to resume over a checkpoint trained on another split.
fn ensure_resumable(ckpt: &CheckpointManager, cfg: &TrainConfig) -> Result<()> {
    if !cfg.resume || !ckpt.has_checkpoint() {
        return Ok(());
    }
    let stored: TrainConfig = ckpt.load_config()?;
    cfg.ensure_same_split(&stored)
        .context("Resume must keep the stored seed, test fraction and caption file")?;
    Ok(())
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainingReport> {
        let cfg = &self.config;

        // ── Step 0: Resume guard ─────────────────────────────────────────────
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ensure_resumable(&ckpt, cfg)?;

        // ── Step 1: Load the caption table ───────────────────────────────────
        tracing::info!("Loading captions from '{}'", cfg.captions_file);
        let samples = CsvCaptionLoader::new(&cfg.captions_file).load_all()?;
        tracing::info!("Loaded {} captions", samples.len());

        // ── Step 2: Train / test split by image ──────────────────────────────
        let (train, test) = split_by_image(samples, cfg.test_fraction, cfg.seed);
        tracing::info!("Split: {} train, {} test captions", train.len(), test.len());

        // ── Step 3: Vocabulary ────────────────────────────────────────────────
        let vocab_store = VocabStore::new(&cfg.checkpoint_dir);
        let vocab = vocab_store.load_or_build(train.iter().map(|s| &s.caption), cfg.freq_threshold)?;

        // ── Step 4: Hyperparameters ───────────────────────────────────────────
        let hyperparams = cfg.hyperparams(vocab.len());
        hyperparams.validate()?;
        tracing::info!(
            "{} model: vocab {}, embed {}, {} epochs, lr {}",
            hyperparams.kind,
            hyperparams.vocab_size,
            hyperparams.embed_size,
            hyperparams.num_epochs,
            hyperparams.learning_rate
        );

        // ── Step 5: Training dataset ──────────────────────────────────────────
        let transform = ImageTransform::for_profile(ImageProfile::for_kind(cfg.model), Split::Train);
        let dataset = CaptionDataset::new(train, &cfg.images_dir, Arc::new(vocab), transform, cfg.seed);

        // ── Step 6: Save config for evaluation ────────────────────────────────
        ckpt.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 7: Run training loop (Layer 5) ───────────────────────────────
        tracing::info!("Training on {}", cfg.device);
        match cfg.device {
            ComputeDevice::Wgpu => self.train_on::<Autodiff<WgpuBackend>>(
                ComputeDevice::wgpu(), &hyperparams, dataset, &ckpt, &metrics,
            ),
            ComputeDevice::Cpu => self.train_on::<Autodiff<CpuBackend>>(
                ComputeDevice::cpu(), &hyperparams, dataset, &ckpt, &metrics,
            ),
        }
        .context("Training failed")
    }

    fn train_on<B: AutodiffBackend>(
        &self,
        device:      B::Device,
        hyperparams: &Hyperparameters,
        dataset:     CaptionDataset,
        ckpt:        &CheckpointManager,
        metrics:     &MetricsLogger,
    ) -> Result<TrainingReport> {
        let cfg  = &self.config;
        let ctx  = ExecutionContext::<B>::new(device, cfg.seed);
        let plan = TrainingPlan {
            batch_size:       cfg.batch_size,
            num_workers:      cfg.num_workers,
            save_every_epoch: cfg.save_checkpoints,
            resume:           cfg.resume,
        };
        let sinks = TrainingSinks { checkpoints: Some(ckpt), metrics: Some(metrics) };

        let report = match hyperparams.kind {
            ModelKind::Global => {
                let model = ShowTellConfig::from_hyperparams(hyperparams).init::<B>(&ctx.device);
                run_training(&ctx, model, hyperparams, &plan, dataset, sinks)?.1
            }
            ModelKind::Attention => {
                let model = ShowAttendTellConfig::from_hyperparams(hyperparams).init::<B>(&ctx.device);
                run_training(&ctx, model, hyperparams, &plan, dataset, sinks)?.1
            }
        };
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_architecture_defaults() {
        let cfg = TrainConfig {
            model:         ModelKind::Global,
            epochs:        Some(3),
            learning_rate: Some(1e-3),
            train_encoder: false,
            ..TrainConfig::default()
        };
        let h = cfg.hyperparams(500);
        assert_eq!(h.kind, ModelKind::Global);
        assert_eq!(h.vocab_size, 500);
        assert_eq!(h.num_epochs, 3);
        assert_eq!(h.learning_rate, 1e-3);
        assert!(!h.train_encoder);
        assert_eq!(h.embed_size, 256);
        assert!(TrainConfig::default().hyperparams(500).train_encoder);
    }

    #[test]
    fn test_split_fields_must_match_on_resume() {
        let stored = TrainConfig::default();
        let schedule = TrainConfig { epochs: Some(50), batch_size: 8, resume: true, ..stored.clone() };
        schedule.ensure_same_split(&stored).unwrap();

        let reseeded = TrainConfig { seed: 7, ..stored.clone() };
        match reseeded.ensure_same_split(&stored) {
            Err(CaptionError::IncompatibleCheckpoint { field, .. }) => assert_eq!(field, "seed"),
            other => panic!("unexpected result: {other:?}"),
        }
        let resplit = TrainConfig { test_fraction: 0.2, ..stored.clone() };
        assert!(resplit.ensure_same_split(&stored).is_err());
    }

    #[test]
    fn test_resume_over_other_split_is_refused() {
        use burn::optim::AdamConfig;

        use crate::infra::checkpoint::CheckpointState;
        use crate::ml::model::{ShowTell, ShowTellConfig};
        use crate::ml::testing::{rng_lock, tiny_hyperparams, TestAutodiffBackend};

        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let original = TrainConfig { checkpoint_dir: dir.path().display().to_string(), ..TrainConfig::default() };
        ckpt.save_config(&original).unwrap();

        // No bundle yet: nothing to protect
        let reseeded = TrainConfig { seed: 99, resume: true, ..original.clone() };
        ensure_resumable(&ckpt, &reseeded).unwrap();

        let hp = tiny_hyperparams(ModelKind::Global, 10);
        let model: ShowTell<TestAutodiffBackend> = ShowTellConfig::from_hyperparams(&hp).init(&Default::default());
        let optim = AdamConfig::new().init::<TestAutodiffBackend, ShowTell<TestAutodiffBackend>>();
        let state = CheckpointState { epoch: 1, losses: vec![1.0], hyperparams: hp };
        ckpt.save(&model, &optim, &state).unwrap();

        let err = ensure_resumable(&ckpt, &reseeded).unwrap_err();
        assert!(format!("{err:#}").contains("seed"), "{err:#}");
        ensure_resumable(&ckpt, &TrainConfig { resume: true, ..original.clone() }).unwrap();
        // Without --resume the run starts over and may re-split
        ensure_resumable(&ckpt, &TrainConfig { seed: 99, ..original }).unwrap();
    }

    #[test]
    fn test_config_survives_json() {
        let cfg = TrainConfig { device: ComputeDevice::Cpu, ..TrainConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"device\":\"cpu\""));
        assert!(json.contains("\"model\":\"attention\""));
        assert_eq!(serde_json::from_str::<TrainConfig>(&json).unwrap(), cfg);
    }
}
