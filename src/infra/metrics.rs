// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one CSV row per training epoch:
//
//   epoch,last_batch_loss,mean_loss,batches
//   1,4.102311,4.873520,1012
//   2,3.544870,3.761044,1012
//   ...
//
// last_batch_loss is what goes into the checkpoint's loss
// history; mean_loss is the average over every batch of the
// epoch and is the smoother curve to plot.
//
// The file is appended to, so a resumed run continues the same
// log instead of overwriting it.
//
// Reference: csv crate documentation (serde serialisation)

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:           usize,
    pub last_batch_loss: f64,
    pub mean_loss:       f64,
    pub batches:         usize,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self { csv_path: dir.join("metrics.csv") })
    }

    /// Append one epoch's row, writing the header first if the file is new.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let is_new = !self.csv_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(m)?;
        writer.flush()?;

        tracing::debug!(
            "Logged epoch {} metrics: last_batch_loss={:.4}, mean_loss={:.4}",
            m.epoch,
            m.last_batch_loss,
            m.mean_loss
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Read every logged row back.
    pub fn read_all(&self) -> Result<Vec<EpochMetrics>> {
        let mut reader = csv::Reader::from_path(&self.csv_path)
            .with_context(|| format!("Cannot read '{}'", self.csv_path.display()))?;
        reader
            .deserialize()
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Malformed metrics row")
    }
}
