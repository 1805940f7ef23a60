// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One generic loop for both architectures:
//
//   for epoch in start..=num_epochs
//     for batch in loader.epoch(e)   (teacher forcing)
//       logits  = model(images, captions[:, :-1])
//       loss    = masked cross-entropy vs captions
//       Adam step
//     history.push(last batch loss)
//     metrics.csv  ← last, mean, batch count
//     checkpoint   ← model + optimizer + {epoch, history, hyperparams}
//
// The history keeps the LAST batch's loss of each epoch, not the
// mean. The mean goes to the metrics CSV and the epoch line only.
//
// Resume restores weights, Adam moments, the epoch counter and
// the history, then carries on at last_epoch + 1. Stored and
// requested hyperparameters must agree before anything loads.
//
// Batches whose every image failed to load arrive as None from
// the batcher and are skipped.
//
// The loader's batch order depends only on (seed, epoch), so a
// fixed seed gives the same loss trajectory for any worker count,
// and a resumed run visits epoch k exactly as an uninterrupted one.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::sync::Arc;

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{batcher::CaptionBatcher, dataset::CaptionDataset, prefetch::EpochLoader};
use crate::domain::hyperparams::Hyperparameters;
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointState},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    context::ExecutionContext,
    decoding::{caption_loss, teacher_forced},
    model::Captioner,
};

/// Loop settings that are not part of the model architecture.
#[derive(Debug, Clone)]
pub struct TrainingPlan {
    pub batch_size:  usize,
    /// Image decoding threads; never affects batch order
    pub num_workers: usize,
    /// Checkpoint after every epoch
    pub save_every_epoch: bool,
    /// Continue from the latest checkpoint if there is one
    pub resume: bool,
}

/// Where checkpoints and metrics go. Both are optional so tests
/// can train without touching the filesystem.
#[derive(Default)]
pub struct TrainingSinks<'a> {
    pub checkpoints: Option<&'a CheckpointManager>,
    pub metrics:     Option<&'a MetricsLogger>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Last-batch loss per epoch, including epochs restored on resume
    pub losses:       Vec<f64>,
    /// Metrics of the epochs run by this call
    pub epochs:       Vec<EpochMetrics>,
    pub resumed_from: Option<usize>,
}

pub fn run_training<B, M>(
    ctx:         &ExecutionContext<B>,
    mut model:   M,
    hyperparams: &Hyperparameters,
    plan:        &TrainingPlan,
    dataset:     CaptionDataset,
    sinks:       TrainingSinks<'_>,
) -> Result<(M, TrainingReport)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Captioner<B>,
{
    hyperparams.validate()?;

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init::<B, M>();

    // ── Resume ────────────────────────────────────────────────────────────────
    let mut losses: Vec<f64> = Vec::new();
    let mut start_epoch  = 1;
    let mut resumed_from = None;

    if plan.resume {
        match sinks.checkpoints {
            Some(ckpt) if ckpt.has_checkpoint() => {
                let state = ckpt.load_state()?;
                state.hyperparams.ensure_compatible(hyperparams)?;
                model = ckpt.load_model(model, &ctx.device)?;
                model.ensure_matches(hyperparams)?;
                optim = ckpt.load_optimizer::<B, M, _>(optim, &ctx.device)?;

                tracing::info!(
                    "Resumed from epoch {} ({} losses restored)",
                    state.epoch,
                    state.losses.len()
                );
                start_epoch  = state.epoch + 1;
                losses       = state.losses;
                resumed_from = Some(state.epoch);
            }
            Some(ckpt) => tracing::warn!(
                "No checkpoint in '{}', starting from scratch",
                ckpt.dir().display()
            ),
            None => tracing::warn!("Resume requested without a checkpoint directory"),
        }
    }

    if start_epoch > hyperparams.num_epochs {
        tracing::info!(
            "Already trained for {} of {} epochs, nothing to do",
            start_epoch - 1,
            hyperparams.num_epochs
        );
        return Ok((model, TrainingReport { losses, epochs: Vec::new(), resumed_from }));
    }

    // ── Data loader ───────────────────────────────────────────────────────────
    let image_size = dataset.transform().output_size() as usize;
    let samples    = dataset.samples().len();
    let batcher    = CaptionBatcher::<B>::new(ctx.device.clone(), image_size);
    let loader     = EpochLoader::new(
        Arc::new(dataset),
        batcher,
        plan.batch_size,
        plan.num_workers,
        ctx.seed,
    );

    tracing::info!(
        "Training {} model on {} captions: epochs {}..={}, {} batches of {}",
        hyperparams.kind,
        samples,
        start_epoch,
        hyperparams.num_epochs,
        loader.num_batches(),
        plan.batch_size
    );

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut epochs = Vec::new();
    for epoch in start_epoch..=hyperparams.num_epochs {
        let mut loss_sum  = 0.0f64;
        let mut last_loss = f64::NAN;
        let mut batches   = 0usize;

        for batch in loader.epoch(epoch).flatten() {
            let out  = teacher_forced(&model, batch.images, batch.captions)?;
            let loss = caption_loss(out.logits, out.targets);

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            loss_sum  += loss_val;
            last_loss  = loss_val;
            batches   += 1;

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(hyperparams.learning_rate, model, grads);
        }

        if batches == 0 {
            bail!("Epoch {epoch} produced no batches: no image could be loaded");
        }

        let metrics = EpochMetrics {
            epoch,
            last_batch_loss: last_loss,
            mean_loss:       loss_sum / batches as f64,
            batches,
        };
        losses.push(last_loss);

        println!(
            "Epoch {:>3}/{} | loss={:.4} | mean_loss={:.4} | batches={}",
            epoch, hyperparams.num_epochs, metrics.last_batch_loss, metrics.mean_loss, batches,
        );

        if let Some(logger) = sinks.metrics {
            logger.log(&metrics)?;
        }
        if plan.save_every_epoch {
            if let Some(ckpt) = sinks.checkpoints {
                let state = CheckpointState {
                    epoch,
                    losses:      losses.clone(),
                    hyperparams: hyperparams.clone(),
                };
                ckpt.save(&model, &optim, &state)?;
                tracing::info!("Checkpoint saved for epoch {}", epoch);
            }
        }
        epochs.push(metrics);
    }

    if let Some(logger) = sinks.metrics {
        tracing::info!("Epoch metrics in '{}'", logger.csv_path().display());
    }
    tracing::info!("Training complete!");
    Ok((model, TrainingReport { losses, epochs, resumed_from }))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hyperparams::ModelKind;
    use crate::ml::model::{ShowAttendTellConfig, ShowTellConfig};
    use crate::ml::testing::{fixture_dataset, rng_lock, tiny_hyperparams, TestAutodiffBackend};

    type B = TestAutodiffBackend;

    fn plan() -> TrainingPlan {
        TrainingPlan { batch_size: 3, num_workers: 1, save_every_epoch: true, resume: false }
    }

    fn train_global(
        dir:   &std::path::Path,
        epochs: usize,
        plan:  &TrainingPlan,
        sinks: TrainingSinks<'_>,
    ) -> TrainingReport {
        let (dataset, vocab) = fixture_dataset(dir, 4, 5);
        let mut h = tiny_hyperparams(ModelKind::Global, vocab.len());
        h.num_epochs = epochs;

        let ctx = ExecutionContext::<B>::new(Default::default(), 5);
        let model = ShowTellConfig::from_hyperparams(&h).init::<B>(&ctx.device);
        run_training(&ctx, model, &h, plan, dataset, sinks).unwrap().1
    }

    #[test]
    fn test_same_seed_gives_same_losses() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let first  = train_global(dir.path(), 2, &plan(), TrainingSinks::default());
        let second = train_global(dir.path(), 2, &plan(), TrainingSinks::default());
        assert_eq!(first.losses.len(), 2);
        assert_eq!(first.losses, second.losses);
        assert!(first.losses.iter().all(|l| l.is_finite() && *l > 0.0));
    }

    #[test]
    fn test_worker_pool_keeps_losses_reproducible() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let pooled = TrainingPlan { num_workers: 4, ..plan() };

        let reference = train_global(dir.path(), 2, &plan(), TrainingSinks::default());
        for _ in 0..4 {
            let run = train_global(dir.path(), 2, &pooled, TrainingSinks::default());
            assert_eq!(run.losses, reference.losses);
        }
    }

    #[test]
    fn test_history_keeps_last_batch_loss() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().join("out")).unwrap();
        let sinks = TrainingSinks { checkpoints: None, metrics: Some(&logger) };
        let report = train_global(dir.path(), 2, &plan(), sinks);

        // 8 captions in batches of 3
        let logged = logger.read_all().unwrap();
        assert_eq!(logged.len(), 2);
        for (loss, row) in report.losses.iter().zip(&logged) {
            assert_eq!(row.batches, 3);
            assert!((loss - row.last_batch_loss).abs() < 1e-9);
        }
        assert_eq!(report.epochs, logged);
    }

    #[test]
    fn test_resume_continues_after_last_epoch() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt")).unwrap();

        let first = train_global(
            dir.path(),
            1,
            &plan(),
            TrainingSinks { checkpoints: Some(&ckpt), metrics: None },
        );
        assert_eq!(ckpt.load_state().unwrap().epoch, 1);

        let resume = TrainingPlan { resume: true, ..plan() };
        let second = train_global(
            dir.path(),
            2,
            &resume,
            TrainingSinks { checkpoints: Some(&ckpt), metrics: None },
        );
        assert_eq!(second.resumed_from, Some(1));
        assert_eq!(second.losses.len(), 2);
        assert_eq!(second.losses[0], first.losses[0]);
        assert_eq!(second.epochs.len(), 1);
        assert_eq!(second.epochs[0].epoch, 2);
        assert_eq!(ckpt.load_state().unwrap().losses, second.losses);
    }

    #[test]
    fn test_resume_rejects_other_architecture() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        train_global(
            dir.path(),
            1,
            &plan(),
            TrainingSinks { checkpoints: Some(&ckpt), metrics: None },
        );

        let (dataset, vocab) = fixture_dataset(dir.path(), 4, 5);
        let h = tiny_hyperparams(ModelKind::Attention, vocab.len());
        let ctx = ExecutionContext::<B>::new(Default::default(), 5);
        let model = ShowAttendTellConfig::from_hyperparams(&h).init::<B>(&ctx.device);
        let resume = TrainingPlan { resume: true, ..plan() };
        let sinks = TrainingSinks { checkpoints: Some(&ckpt), metrics: None };

        let err = run_training(&ctx, model, &h, &resume, dataset, sinks).unwrap_err();
        assert!(err.to_string().contains("kind"), "{err}");
    }

    #[test]
    fn test_attention_model_trains() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let (dataset, vocab) = fixture_dataset(dir.path(), 3, 9);
        let h = tiny_hyperparams(ModelKind::Attention, vocab.len());
        let ctx = ExecutionContext::<B>::new(Default::default(), 9);
        let model = ShowAttendTellConfig::from_hyperparams(&h).init::<B>(&ctx.device);

        let (_, report) =
            run_training(&ctx, model, &h, &plan(), dataset, TrainingSinks::default()).unwrap();
        assert_eq!(report.losses.len(), h.num_epochs);
        assert!(report.losses.iter().all(|l| l.is_finite()));
    }
}
