// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Output file: <checkpoint_dir>/metrics.csv
//
//   epoch,train_loss,val_loss,train_acc,val_acc,improved
//   1,1.512300,1.402100,0.312000,0.354000,1
//   2,1.301800,1.420500,0.401000,0.339000,0
//
// How to read the metrics:
//   - If val_loss rises while train_loss falls → overfitting
//   - `improved` marks the epochs whose weights were saved

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::evaluation::EvalSummary;

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch:      usize,
    pub train_loss: f64,
    pub val_loss:   f64,
    pub train_acc:  f64,
    pub val_acc:    f64,
    /// Validation loss was the best of the run; weights were saved
    pub improved:   bool,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train: &EvalSummary, val: &EvalSummary, improved: bool) -> Self {
        Self {
            epoch,
            train_loss: train.loss,
            val_loss:   val.loss,
            train_acc:  train.accuracy,
            val_acc:    val.accuracy,
            improved,
        }
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start a fresh metrics file for a new run, replacing any previous one.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "epoch,train_loss,val_loss,train_acc,val_acc,improved")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{}",
            m.epoch,
            m.train_loss,
            m.val_loss,
            m.train_acc,
            m.val_acc,
            u8::from(m.improved),
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn summary(loss: f64, accuracy: f64) -> EvalSummary {
        EvalSummary { loss, accuracy, samples: 4 }
    }

    #[test]
    fn test_rows_are_appended_after_header() {
        let tmp    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::create(tmp.path()).unwrap();
        logger.log(&EpochMetrics::new(1, &summary(1.5, 0.25), &summary(1.4, 0.5), true)).unwrap();
        logger.log(&EpochMetrics::new(2, &summary(1.2, 0.5), &summary(1.45, 0.5), false)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "epoch,train_loss,val_loss,train_acc,val_acc,improved");
        assert_eq!(lines[1], "1,1.500000,1.400000,0.250000,0.500000,1");
        assert!(lines[2].ends_with(",0"));
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        let first = MetricsLogger::create(tmp.path()).unwrap();
        first.log(&EpochMetrics::new(1, &summary(1.0, 0.0), &summary(1.0, 0.0), true)).unwrap();

        let second = MetricsLogger::create(tmp.path()).unwrap();
        let text   = fs::read_to_string(second.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
