//! Checkpoint files
//!
//! A checkpoint is one JSON document holding parameters, optimizer and
//! schedule state and the monitor's progress. Files are written to a
//! temporary sibling and renamed into place.

use super::monitor::MonitorMode;
use crate::model::ReportModel;
use crate::optim::{OptimizerState, SchedulerState};
use crate::tracking::EpochLog;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const BEST_CHECKPOINT: &str = "model_best.json";
pub const CURRENT_CHECKPOINT: &str = "current_checkpoint.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedParameter {
    pub name: String,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last completed epoch (1-based)
    pub epoch: usize,
    pub monitor_metric: String,
    pub monitor_mode: MonitorMode,
    pub best: Option<f64>,
    pub epochs_without_improvement: usize,
    pub vocab_size: usize,
    pub params: Vec<NamedParameter>,
    pub optimizer: OptimizerState,
    pub scheduler: SchedulerState,
    #[serde(default)]
    pub best_record: Option<EpochLog>,
}

impl Checkpoint {
    /// Snapshot the model parameters
    pub fn capture_params(model: &dyn ReportModel) -> Vec<NamedParameter> {
        model
            .parameter_names()
            .into_iter()
            .zip(model.parameters())
            .map(|(name, tensor)| NamedParameter {
                name,
                values: tensor.to_vec(),
            })
            .collect()
    }

    /// Check that this checkpoint fits `model` without touching it
    pub fn check_compatible(&self, model: &dyn ReportModel) -> Result<()> {
        if self.vocab_size != model.vocab_size() {
            return Err(Error::CheckpointCorrupt(format!(
                "vocabulary size {} does not match model vocabulary {}",
                self.vocab_size,
                model.vocab_size()
            )));
        }

        let names = model.parameter_names();
        let params = model.parameters();
        if self.params.len() != params.len() {
            return Err(Error::CheckpointCorrupt(format!(
                "checkpoint has {} parameters, model has {}",
                self.params.len(),
                params.len()
            )));
        }
        for ((saved, name), tensor) in self.params.iter().zip(&names).zip(params) {
            if &saved.name != name || saved.values.len() != tensor.len() {
                return Err(Error::CheckpointCorrupt(format!(
                    "parameter {} ({} values) does not match {} ({} values)",
                    saved.name,
                    saved.values.len(),
                    name,
                    tensor.len()
                )));
            }
        }
        Ok(())
    }

    /// Copy the saved values into `model`
    ///
    /// Call [`Checkpoint::check_compatible`] first.
    pub fn restore_params(&self, model: &mut dyn ReportModel) -> Result<()> {
        for (saved, tensor) in self.params.iter().zip(model.parameters_mut()) {
            tensor.assign(&saved.values)?;
        }
        Ok(())
    }
}

/// Write through a temporary file and rename over `path`
///
/// If `write` fails the temporary file is removed and any existing file at
/// `path` is left untouched.
pub fn atomic_write<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidParameter(format!("not a file path: {}", path.display())))?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Save `checkpoint` to `dir/file_name`, creating `dir` if needed
pub fn save_checkpoint(dir: &Path, file_name: &str, checkpoint: &Checkpoint) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    atomic_write(&path, |writer| {
        serde_json::to_writer(writer, checkpoint)
            .map_err(|e| Error::Serialization(format!("checkpoint serialization failed: {e}")))
    })?;
    Ok(path)
}

pub fn load_checkpoint(path: &Path) -> Result<Checkpoint> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::CheckpointCorrupt(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| Error::CheckpointCorrupt(format!("{}: {e}", path.display())))
}
