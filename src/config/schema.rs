//! YAML schema for a training run

use crate::optim::ScheduleInterval;
use crate::train::MonitorMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete, immutable description of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Dataset identifier (e.g. `iu_xray`, `mimic_cxr`)
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,

    pub data: DataConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub decoding: DecodingConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub training: TrainingConfig,
}

/// Data locations and batching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding the X-ray images
    pub image_dir: PathBuf,

    /// Annotation file with reports and splits
    pub ann_path: PathBuf,

    /// Maximum report length in tokens, including BOS/EOS
    #[serde(default = "default_max_seq_length")]
    pub max_seq_length: usize,

    /// Maximum length for the auxiliary text encoder
    #[serde(default = "default_max_seq_length_bert")]
    pub max_seq_length_bert: usize,

    /// Minimum token frequency to enter the vocabulary
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Model collaborator settings the core needs to know about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_visual_extractor")]
    pub visual_extractor: String,

    #[serde(default = "default_true")]
    pub visual_extractor_pretrained: bool,

    /// Weight of the contrastive alignment term in the loss
    #[serde(default = "default_contras_loss_w")]
    pub contras_loss_w: f32,

    #[serde(default)]
    pub bos_idx: usize,

    #[serde(default)]
    pub eos_idx: usize,

    #[serde(default)]
    pub pad_idx: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            visual_extractor: default_visual_extractor(),
            visual_extractor_pretrained: true,
            contras_loss_w: default_contras_loss_w(),
            bos_idx: 0,
            eos_idx: 0,
            pad_idx: 0,
        }
    }
}

/// Decoding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMethod {
    #[default]
    BeamSearch,
    Greedy,
    Sample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodingConfig {
    #[serde(default)]
    pub sample_method: SampleMethod,

    #[serde(default = "default_beam_size")]
    pub beam_size: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Sequences returned per sample
    #[serde(default = "default_one")]
    pub sample_n: usize,

    /// Forbid repeating the previous token
    #[serde(default)]
    pub decoding_constraint: bool,

    /// Forbid completing a trigram already in the hypothesis
    #[serde(default = "default_true")]
    pub block_trigrams: bool,

    /// Rank beams by mean log-probability per token
    #[serde(default)]
    pub length_normalize: bool,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            sample_method: SampleMethod::BeamSearch,
            beam_size: default_beam_size(),
            temperature: default_temperature(),
            sample_n: 1,
            decoding_constraint: false,
            block_trigrams: true,
            length_normalize: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// `Adam` or `AdamW`
    #[serde(default = "default_optimizer")]
    pub name: String,

    /// Learning rate of the visual extractor
    #[serde(default = "default_lr_ve")]
    pub lr_ve: f32,

    /// Learning rate of every other parameter
    #[serde(default = "default_lr_ed")]
    pub lr_ed: f32,

    #[serde(default = "default_weight_decay")]
    pub weight_decay: f32,

    #[serde(default = "default_true")]
    pub amsgrad: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            name: default_optimizer(),
            lr_ve: default_lr_ve(),
            lr_ed: default_lr_ed(),
            weight_decay: default_weight_decay(),
            amsgrad: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// `StepLR`, `ExponentialLR` or `CosineAnnealingLR`
    #[serde(default = "default_scheduler")]
    pub name: String,

    /// StepLR period; CosineAnnealingLR half-period
    #[serde(default = "default_step_size")]
    pub step_size: usize,

    #[serde(default = "default_gamma")]
    pub gamma: f32,

    #[serde(default)]
    pub interval: ScheduleInterval,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_scheduler(),
            step_size: default_step_size(),
            gamma: default_gamma(),
            interval: ScheduleInterval::Epoch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Checkpoint directory
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// Directory for per-epoch tracking records
    #[serde(default = "default_record_dir")]
    pub record_dir: PathBuf,

    /// Write `current_checkpoint.json` every N epochs
    #[serde(default = "default_one")]
    pub save_period: usize,

    #[serde(default)]
    pub monitor_mode: MonitorMode,

    #[serde(default = "default_monitor_metric")]
    pub monitor_metric: String,

    /// Non-improving epochs tolerated before stopping
    #[serde(default = "default_early_stop")]
    pub early_stop: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Checkpoint to resume from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<PathBuf>,

    /// Clamp gradients element-wise before each step
    #[serde(default = "default_grad_clip_value")]
    pub grad_clip_value: Option<f32>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            save_dir: default_save_dir(),
            record_dir: default_record_dir(),
            save_period: 1,
            monitor_mode: MonitorMode::Max,
            monitor_metric: default_monitor_metric(),
            early_stop: default_early_stop(),
            seed: default_seed(),
            resume: None,
            grad_clip_value: default_grad_clip_value(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> usize {
    1
}

fn default_dataset_name() -> String {
    "iu_xray".to_string()
}

fn default_max_seq_length() -> usize {
    60
}

fn default_max_seq_length_bert() -> usize {
    80
}

fn default_threshold() -> usize {
    3
}

fn default_num_workers() -> usize {
    8
}

fn default_batch_size() -> usize {
    32
}

fn default_visual_extractor() -> String {
    "resnet101".to_string()
}

fn default_contras_loss_w() -> f32 {
    1.0
}

fn default_beam_size() -> usize {
    3
}

fn default_temperature() -> f32 {
    1.0
}

fn default_optimizer() -> String {
    "Adam".to_string()
}

fn default_lr_ve() -> f32 {
    5e-5
}

fn default_lr_ed() -> f32 {
    1e-4
}

fn default_weight_decay() -> f32 {
    1e-4
}

fn default_scheduler() -> String {
    "StepLR".to_string()
}

fn default_step_size() -> usize {
    50
}

fn default_gamma() -> f32 {
    0.1
}

fn default_epochs() -> usize {
    100
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("results/xrgen")
}

fn default_record_dir() -> PathBuf {
    PathBuf::from("records")
}

fn default_monitor_metric() -> String {
    "BLEU_4".to_string()
}

fn default_early_stop() -> usize {
    20
}

fn default_seed() -> u64 {
    123
}

fn default_grad_clip_value() -> Option<f32> {
    Some(0.1)
}
