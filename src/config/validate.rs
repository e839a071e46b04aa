//! Configuration validation

use super::schema::{RunConfig, SampleMethod};
use crate::metrics::METRIC_NAMES;

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Image directory does not exist: {0}")]
    ImageDirNotFound(String),

    #[error("Annotation file does not exist: {0}")]
    AnnotationNotFound(String),

    #[error("Invalid learning rate {name}: {value} (must be > 0.0)")]
    InvalidLearningRate { name: &'static str, value: f32 },

    #[error("Invalid weight decay: {0} (must be >= 0.0)")]
    InvalidWeightDecay(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid save period: {0} (must be > 0)")]
    InvalidSavePeriod(usize),

    #[error("Invalid max sequence length: {0} (must be >= 2)")]
    InvalidMaxSeqLength(usize),

    #[error("Invalid beam size: {0} (must be > 0)")]
    InvalidBeamSize(usize),

    #[error("Invalid sample_n: {sample_n} (must be between 1 and beam size {beam_size})")]
    InvalidSampleN { sample_n: usize, beam_size: usize },

    #[error("Invalid temperature: {0} (must be > 0.0)")]
    InvalidTemperature(f32),

    #[error("Invalid optimizer: {0} (must be one of: Adam, AdamW)")]
    InvalidOptimizer(String),

    #[error("Invalid lr scheduler: {0} (must be one of: StepLR, ExponentialLR, CosineAnnealingLR)")]
    InvalidScheduler(String),

    #[error("Invalid step size: {0} (must be > 0)")]
    InvalidStepSize(usize),

    #[error("Invalid gamma: {0} (must be in (0, 1])")]
    InvalidGamma(f32),

    #[error("Unknown monitor metric: {0} (must be one of: BLEU_1..BLEU_4, ROUGE_L, CIDEr)")]
    InvalidMonitorMetric(String),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),
}

pub(crate) const OPTIMIZERS: [&str; 2] = ["adam", "adamw"];
pub(crate) const SCHEDULERS: [&str; 3] = ["steplr", "exponentiallr", "cosineannealinglr"];

/// Validate value ranges and names
///
/// File system paths are checked separately by [`validate_paths`] so a
/// configuration can be inspected away from the data.
pub fn validate_config(config: &RunConfig) -> Result<(), ValidationError> {
    if config.data.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(config.data.batch_size));
    }
    if config.data.max_seq_length < 2 {
        return Err(ValidationError::InvalidMaxSeqLength(config.data.max_seq_length));
    }

    let decoding = &config.decoding;
    if decoding.beam_size == 0 {
        return Err(ValidationError::InvalidBeamSize(decoding.beam_size));
    }
    let max_n = match decoding.sample_method {
        SampleMethod::BeamSearch => decoding.beam_size,
        SampleMethod::Greedy | SampleMethod::Sample => usize::MAX,
    };
    if decoding.sample_n == 0 || decoding.sample_n > max_n {
        return Err(ValidationError::InvalidSampleN {
            sample_n: decoding.sample_n,
            beam_size: decoding.beam_size,
        });
    }
    if decoding.temperature <= 0.0 || decoding.temperature.is_nan() {
        return Err(ValidationError::InvalidTemperature(decoding.temperature));
    }

    let optim = &config.optimizer;
    if !OPTIMIZERS.contains(&optim.name.to_lowercase().as_str()) {
        return Err(ValidationError::InvalidOptimizer(optim.name.clone()));
    }
    for (name, value) in [("lr_ve", optim.lr_ve), ("lr_ed", optim.lr_ed)] {
        if value <= 0.0 || value.is_nan() {
            return Err(ValidationError::InvalidLearningRate { name, value });
        }
    }
    if optim.weight_decay < 0.0 || optim.weight_decay.is_nan() {
        return Err(ValidationError::InvalidWeightDecay(optim.weight_decay));
    }

    let sched = &config.scheduler;
    let sched_name = sched.name.to_lowercase();
    if !SCHEDULERS.contains(&sched_name.as_str()) {
        return Err(ValidationError::InvalidScheduler(sched.name.clone()));
    }
    if sched_name != "exponentiallr" && sched.step_size == 0 {
        return Err(ValidationError::InvalidStepSize(sched.step_size));
    }
    if sched_name != "cosineannealinglr" && !(sched.gamma > 0.0 && sched.gamma <= 1.0) {
        return Err(ValidationError::InvalidGamma(sched.gamma));
    }

    let training = &config.training;
    if training.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(training.epochs));
    }
    if training.save_period == 0 {
        return Err(ValidationError::InvalidSavePeriod(training.save_period));
    }
    if !METRIC_NAMES.contains(&training.monitor_metric.as_str()) {
        return Err(ValidationError::InvalidMonitorMetric(
            training.monitor_metric.clone(),
        ));
    }
    if let Some(clip) = training.grad_clip_value {
        if clip <= 0.0 || clip.is_nan() {
            return Err(ValidationError::InvalidGradClip(clip));
        }
    }

    Ok(())
}

/// Check that the data paths exist
pub fn validate_paths(config: &RunConfig) -> Result<(), ValidationError> {
    if !config.data.image_dir.is_dir() {
        return Err(ValidationError::ImageDirNotFound(
            config.data.image_dir.display().to_string(),
        ));
    }
    if !config.data.ann_path.is_file() {
        return Err(ValidationError::AnnotationNotFound(
            config.data.ann_path.display().to_string(),
        ));
    }
    Ok(())
}
