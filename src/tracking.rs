//! Per-epoch experiment records
//!
//! The trainer hands one [`EpochLog`] per epoch to a [`TrackingSink`]. Sink
//! failures never stop training.

use crate::metrics::MetricReport;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Everything recorded about one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLog {
    pub epoch: usize,
    /// Mean training loss
    pub train_loss: f32,
    /// Learning rate per optimizer group, in group order
    pub lrs: Vec<f32>,
    pub val: MetricReport,
    pub test: Option<MetricReport>,
    pub is_best: bool,
    pub timestamp: DateTime<Utc>,
}

impl EpochLog {
    /// Flat `name -> value` view with `val_`/`test_` metric prefixes
    pub fn flatten(&self) -> Vec<(String, f64)> {
        let mut out = vec![
            ("epoch".to_string(), self.epoch as f64),
            ("train_loss".to_string(), f64::from(self.train_loss)),
        ];
        out.extend(self.val.prefixed("val_"));
        if let Some(test) = &self.test {
            out.extend(test.prefixed("test_"));
        }
        out
    }
}

pub trait TrackingSink {
    fn log_epoch(&mut self, log: &EpochLog) -> Result<()>;

    fn name(&self) -> &str;
}

/// Appends one JSON object per line
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<record_dir>/<dataset_name>.jsonl`
    pub fn for_run(record_dir: &Path, dataset_name: &str) -> Self {
        Self::new(record_dir.join(format!("{dataset_name}.jsonl")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record
    pub fn read_all(&self) -> Result<Vec<EpochLog>> {
        let content = fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| Error::Serialization(format!("bad tracking record: {e}")))
            })
            .collect()
    }
}

impl TrackingSink for JsonLinesSink {
    fn log_epoch(&mut self, log: &EpochLog) -> Result<()> {
        let fail = |e: std::io::Error| {
            Error::TrackingSinkFailure(format!("{}: {e}", self.path.display()))
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        let line = serde_json::to_string(log)
            .map_err(|e| Error::TrackingSinkFailure(format!("serialize epoch log: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(fail)?;
        writeln!(file, "{line}").map_err(fail)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

/// Keeps records in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    records: Rc<RefCell<Vec<EpochLog>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EpochLog> {
        self.records.borrow().clone()
    }
}

impl TrackingSink for InMemorySink {
    fn log_epoch(&mut self, log: &EpochLog) -> Result<()> {
        self.records.borrow_mut().push(log.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TrackingSink for NullSink {
    fn log_epoch(&mut self, _log: &EpochLog) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::METRIC_NAMES;

    fn log(epoch: usize) -> EpochLog {
        EpochLog {
            epoch,
            train_loss: 1.5,
            lrs: vec![5e-5, 1e-4],
            val: MetricReport::zeroed(METRIC_NAMES),
            test: None,
            is_best: epoch == 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_jsonl_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonLinesSink::for_run(&dir.path().join("records"), "iu_xray");

        sink.log_epoch(&log(1)).unwrap();
        sink.log_epoch(&log(2)).unwrap();

        let records = sink.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].epoch, 2);
        assert!(sink.path().ends_with("iu_xray.jsonl"));
    }

    #[test]
    fn test_jsonl_failure_is_tracking_error() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let mut sink = JsonLinesSink::new(dir.path());
        assert!(matches!(
            sink.log_epoch(&log(1)),
            Err(Error::TrackingSinkFailure(_))
        ));
    }

    #[test]
    fn test_in_memory_clones_share_records() {
        let sink = InMemorySink::new();
        let mut handle = sink.clone();
        handle.log_epoch(&log(1)).unwrap();
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_flatten_prefixes_metrics() {
        let mut entry = log(3);
        entry.test = Some(MetricReport::zeroed(METRIC_NAMES));
        let flat = entry.flatten();
        assert!(flat.iter().any(|(k, _)| k == "val_BLEU_4"));
        assert!(flat.iter().any(|(k, _)| k == "test_CIDEr"));
        assert_eq!(flat[0], ("epoch".to_string(), 3.0));
    }
}
