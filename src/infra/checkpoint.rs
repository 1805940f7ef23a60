// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything needed to resume training or
// caption an image, as ONE bundle per epoch:
//
//   checkpoints/
//     latest.json              {"epoch": 3, "dir": "epoch-0003"}
//     epoch-0003/
//       model.mpk.gz           model parameters
//       optimizer.mpk.gz       Adam moment estimates
//       state.json             epoch, loss history, hyperparameters
//     train_config.json        the run's TrainConfig
//
// All-or-nothing publishing:
//   1. Pick a directory name nothing uses yet: epoch-0003, or
//      epoch-0003-r1, -r2, ... when that epoch was saved before
//   2. Write the bundle into a hidden temp dir (.epoch-0003.tmp)
//   3. Rename the temp dir to the new name
//   4. Write latest.json.tmp, rename it over latest.json
//   5. Delete every other epoch dir
//
// No step before 5 touches the bundle latest.json points at. A
// crash before step 4 leaves the previous complete bundle
// published; a crash during step 5 only leaves extra directories
// behind. A reader never follows the pointer into a half-written
// or deleted bundle.
//
// The stored hyperparameters are checked against the caller's
// BEFORE any weights are loaded, and the loaded tensor shapes
// are checked again afterwards.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::{error::CaptionError, hyperparams::Hyperparameters};

type FileRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

const LATEST_FILE: &str = "latest.json";
const STATE_FILE:  &str = "state.json";
const CONFIG_FILE: &str = "train_config.json";

/// Everything in a bundle besides the two binary records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Last completed epoch (1-based)
    pub epoch:       usize,
    /// Last-batch loss of every completed epoch
    pub losses:      Vec<f64>,
    pub hyperparams: Hyperparameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestPointer {
    epoch: usize,
    dir:   String,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First unused bundle name for `epoch`. Saving the same epoch
    /// twice (a fresh run over an old directory) gets a revision
    /// suffix instead of replacing the published bundle in place.
    fn fresh_dir_name(&self, epoch: usize) -> String {
        let base = format!("epoch-{epoch:04}");
        let mut name = base.clone();
        let mut revision = 0;
        while self.dir.join(&name).exists() {
            revision += 1;
            name = format!("{base}-r{revision}");
        }
        name
    }

    // ─── Saving ───────────────────────────────────────────────────────────────

    /// Atomically publish the bundle for `state.epoch`.
    pub fn save<B, M, O>(&self, model: &M, optim: &O, state: &CheckpointState) -> Result<()>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let name  = self.fresh_dir_name(state.epoch);
        let tmp   = self.dir.join(format!(".{name}.tmp"));
        let final_dir = self.dir.join(&name);

        if tmp.exists() {
            fs::remove_dir_all(&tmp)
                .with_context(|| format!("Cannot clear stale '{}'", tmp.display()))?;
        }
        fs::create_dir_all(&tmp)?;

        let recorder = FileRecorder::new();
        recorder
            .record(model.clone().into_record(), tmp.join("model"))
            .with_context(|| format!("Failed to write model record into '{}'", tmp.display()))?;
        recorder
            .record(optim.to_record(), tmp.join("optimizer"))
            .with_context(|| format!("Failed to write optimizer record into '{}'", tmp.display()))?;
        fs::write(tmp.join(STATE_FILE), serde_json::to_string_pretty(state)?)
            .context("Failed to write checkpoint state")?;

        fs::rename(&tmp, &final_dir)
            .with_context(|| format!("Cannot publish '{}'", final_dir.display()))?;

        let pointer = LatestPointer { epoch: state.epoch, dir: name.clone() };
        let latest_tmp = self.dir.join(format!("{LATEST_FILE}.tmp"));
        fs::write(&latest_tmp, serde_json::to_string(&pointer)?)?;
        fs::rename(&latest_tmp, self.dir.join(LATEST_FILE))
            .context("Cannot update latest.json")?;

        self.prune_except(&name);
        tracing::debug!("Saved checkpoint: epoch {} → '{}'", state.epoch, final_dir.display());
        Ok(())
    }

    /// Remove every other epoch bundle. Failures only cost disk space.
    fn prune_except(&self, keep: &str) {
        let Ok(entries) = fs::read_dir(&self.dir) else { return };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("epoch-") && name != keep && entry.path().is_dir() {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    tracing::warn!("Cannot remove old checkpoint '{}': {}", name, e);
                }
            }
        }
    }

    // ─── Loading ──────────────────────────────────────────────────────────────

    fn latest(&self) -> Result<LatestPointer> {
        let path = self.dir.join(LATEST_FILE);
        if !path.exists() {
            return Err(CaptionError::MissingCheckpoint(self.dir.clone()).into());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }

    /// True once at least one bundle has been published.
    pub fn has_checkpoint(&self) -> bool {
        self.dir.join(LATEST_FILE).exists()
    }

    fn latest_dir(&self) -> Result<PathBuf> {
        Ok(self.dir.join(self.latest()?.dir))
    }

    pub fn load_state(&self) -> Result<CheckpointState> {
        let path = self.latest_dir()?.join(STATE_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }

    /// Load weights into `model`, which must already have the
    /// stored architecture (see `CheckpointState::hyperparams`).
    pub fn load_model<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let path = self.latest_dir()?.join("model");
        let record = FileRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load model record '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    pub fn load_optimizer<B, M, O>(&self, optim: O, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let path = self.latest_dir()?.join("optimizer");
        let record = FileRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load optimizer record '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }

    // ─── Training Config ──────────────────────────────────────────────────────

    pub fn save_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::optim::AdamConfig;

    use crate::domain::hyperparams::ModelKind;
    use crate::ml::model::{Captioner, ShowTell, ShowTellConfig};
    use crate::ml::testing::{rng_lock, tiny_hyperparams, TestAutodiffBackend, TestBackend};

    fn state(epoch: usize, hyperparams: &Hyperparameters) -> CheckpointState {
        CheckpointState { epoch, losses: vec![1.0; epoch], hyperparams: hyperparams.clone() }
    }

    #[test]
    fn test_missing_checkpoint_is_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(!ckpt.has_checkpoint());
        let err = ckpt.load_state().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptionError>(),
            Some(CaptionError::MissingCheckpoint(_))
        ));
    }

    #[test]
    fn test_save_publishes_bundle_and_prunes_older() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let hp = tiny_hyperparams(ModelKind::Global, 10);
        let model: ShowTell<TestAutodiffBackend> = ShowTellConfig::from_hyperparams(&hp).init(&device);
        let optim = AdamConfig::new().init::<TestAutodiffBackend, ShowTell<TestAutodiffBackend>>();

        ckpt.save(&model, &optim, &state(1, &hp)).unwrap();
        ckpt.save(&model, &optim, &state(2, &hp)).unwrap();

        assert!(dir.path().join("epoch-0002/model.mpk.gz").exists());
        assert!(dir.path().join("epoch-0002/optimizer.mpk.gz").exists());
        assert!(!dir.path().join("epoch-0001").exists());
        assert!(!dir.path().join(".epoch-0002.tmp").exists());

        let loaded = ckpt.load_state().unwrap();
        assert_eq!(loaded, state(2, &hp));
    }

    #[test]
    fn test_resaving_published_epoch_keeps_old_bundle_until_switch() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let hp = tiny_hyperparams(ModelKind::Global, 10);
        let model: ShowTell<TestAutodiffBackend> = ShowTellConfig::from_hyperparams(&hp).init(&device);
        let optim = AdamConfig::new().init::<TestAutodiffBackend, ShowTell<TestAutodiffBackend>>();

        ckpt.save(&model, &optim, &state(1, &hp)).unwrap();
        let published = ckpt.latest_dir().unwrap();
        assert!(published.ends_with("epoch-0001"));

        // A new run over the same directory reaches epoch 1 again
        let rerun = CheckpointState { losses: vec![0.5], ..state(1, &hp) };
        assert_eq!(ckpt.fresh_dir_name(1), "epoch-0001-r1");
        ckpt.save(&model, &optim, &rerun).unwrap();

        let republished = ckpt.latest_dir().unwrap();
        assert!(republished.ends_with("epoch-0001-r1"));
        assert!(republished.join("model.mpk.gz").exists());
        assert!(!published.exists());
        assert_eq!(ckpt.load_state().unwrap(), rerun);

        // The revision suffix does not stick to later epochs
        ckpt.save(&model, &optim, &state(2, &hp)).unwrap();
        assert!(ckpt.latest_dir().unwrap().ends_with("epoch-0002"));
        assert!(!republished.exists());
    }

    #[test]
    fn test_model_round_trip_preserves_weights() {
        let _guard = rng_lock();
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let hp = tiny_hyperparams(ModelKind::Global, 10);
        let model: ShowTell<TestAutodiffBackend> = ShowTellConfig::from_hyperparams(&hp).init(&device);
        let optim = AdamConfig::new().init::<TestAutodiffBackend, ShowTell<TestAutodiffBackend>>();
        ckpt.save(&model, &optim, &state(1, &hp)).unwrap();

        let fresh: ShowTell<TestBackend> = ShowTellConfig::from_hyperparams(&hp).init(&device);
        let restored = ckpt.load_model(fresh, &device).unwrap();

        let before = model.valid().fc.weight.val().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        let after  = restored.fc.weight.val().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(before, after);
        restored.ensure_matches(&hp).unwrap();
    }

    #[test]
    fn test_shape_check_catches_wrong_vocab() {
        let device = Default::default();
        let hp = tiny_hyperparams(ModelKind::Global, 10);
        let model: ShowTell<TestBackend> = ShowTellConfig::from_hyperparams(&hp).init(&device);

        let mut other = hp.clone();
        other.vocab_size = 11;
        assert!(matches!(
            model.ensure_matches(&other),
            Err(CaptionError::IncompatibleCheckpoint { .. })
        ));
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let hp = tiny_hyperparams(ModelKind::Attention, 20);
        ckpt.save_config(&hp).unwrap();
        let back: Hyperparameters = ckpt.load_config().unwrap();
        assert_eq!(back, hp);
    }
}
