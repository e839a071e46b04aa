//! Declarative YAML run configuration
//!
//! A run is described once in YAML, validated, and then shared read-only by
//! every component.
//!
//! # Example
//!
//! ```yaml
//! dataset_name: iu_xray
//! data:
//!   image_dir: data/iu_xray/images
//!   ann_path: data/iu_xray/annotation.json
//!   max_seq_length: 60
//!
//! optimizer:
//!   name: Adam
//!   lr_ve: 5.0e-5
//!   lr_ed: 1.0e-4
//!
//! training:
//!   monitor_metric: BLEU_4
//!   early_stop: 20
//! ```

mod builder;
mod cli;
mod load;
mod schema;
mod validate;


pub use builder::{build_lr_scheduler, build_optimizer};
pub use cli::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, OverrideArgs, ScoreArgs,
    ValidateArgs,
};
pub use load::{load_config, parse_config};
pub use schema::{
    DataConfig, DecodingConfig, ModelConfig, OptimizerConfig, RunConfig, SampleMethod,
    SchedulerConfig, TrainingConfig,
};
pub use validate::{validate_config, validate_paths, ValidationError};
