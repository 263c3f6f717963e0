// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends training and evaluation metrics to CSV files under
// <run_dir>/outputs/.
//
//   train_log.csv   step,loss,lr
//   eval_log.csv    step,weights,is,is_std,fid
//
// Files are appended across resumed runs; the header is written
// only when the file is created.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    marker::PhantomData,
    path::{Path, PathBuf},
};

/// A row type with a fixed CSV layout.
pub trait CsvRow {
    const FILE_NAME: &'static str;
    const HEADER: &'static str;

    fn to_csv(&self) -> String;
}

/// Averaged loss over the last logging window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRow {
    pub step: usize,
    pub loss: f64,
    pub lr:   f64,
}

impl CsvRow for TrainRow {
    const FILE_NAME: &'static str = "train_log.csv";
    const HEADER: &'static str = "step,loss,lr";

    fn to_csv(&self) -> String {
        format!("{},{:.6},{:.6e}", self.step, self.loss, self.lr)
    }
}

/// IS / FID of one set of weights at one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRow {
    pub step:    usize,
    /// "model" or "ema"
    pub weights: String,
    pub is:      f64,
    pub is_std:  f64,
    pub fid:     f64,
}

impl CsvRow for EvalRow {
    const FILE_NAME: &'static str = "eval_log.csv";
    const HEADER: &'static str = "step,weights,is,is_std,fid";

    fn to_csv(&self) -> String {
        format!("{},{},{:.4},{:.4},{:.4}", self.step, self.weights, self.is, self.is_std, self.fid)
    }
}

pub struct MetricsLogger<R: CsvRow> {
    csv_path: PathBuf,
    _row:     PhantomData<R>,
}

impl<R: CsvRow> MetricsLogger<R> {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics dir '{}'", dir.display()))?;

        let csv_path = dir.join(R::FILE_NAME);
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{}", R::HEADER)?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path, _row: PhantomData })
    }

    pub fn log(&self, row: &R) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", row.to_csv())?;
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

    #[test]
    fn test_header_written_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();

        let log = MetricsLogger::<TrainRow>::new(dir.path()).unwrap();
        log.log(&TrainRow { step: 100, loss: 0.5, lr: 2e-4 }).unwrap();

        // reopening (as a resumed run does) must not duplicate the header
        let log = MetricsLogger::<TrainRow>::new(dir.path()).unwrap();
        log.log(&TrainRow { step: 200, loss: 0.25, lr: 1e-4 }).unwrap();

        let text = fs::read_to_string(log.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["step,loss,lr", "100,0.500000,2.000000e-4", "200,0.250000,1.000000e-4"]);
    }

    #[test]
    fn test_eval_rows_go_to_their_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = MetricsLogger::<EvalRow>::new(dir.path()).unwrap();
        log.log(&EvalRow { step: 1000, weights: "ema".into(), is: 7.5, is_std: 0.12346, fid: 31.0 })
            .unwrap();

        assert!(log.csv_path().ends_with("eval_log.csv"));
        let text = fs::read_to_string(log.csv_path()).unwrap();
        assert_eq!(text.lines().nth(1), Some("1000,ema,7.5000,0.1235,31.0000"));
    }
}
