//! Command-line interface
//!
//! # Usage
//!
//! ```bash
//! informe validate configs/iu_xray.yaml --detailed
//! informe info configs/iu_xray.yaml --format yaml --epochs 50
//! informe score references.json hypotheses.json --format json
//! ```

use super::schema::RunConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Radiology report generation: configuration and evaluation tools
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "informe")]
#[command(version)]
#[command(about = "Training and evaluation core for chest X-ray report generation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a run configuration
    Validate(ValidateArgs),

    /// Print the resolved run configuration
    Info(InfoArgs),

    /// Score generated reports against references
    Score(ScoreArgs),
}

/// Overrides applied on top of the YAML file
#[derive(Args, Debug, Clone, PartialEq, Default)]
pub struct OverrideArgs {
    /// Override number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Override checkpoint directory
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Resume from checkpoint
    #[arg(short, long)]
    pub resume: Option<PathBuf>,

    /// Override random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Show the validated settings
    #[arg(short, long)]
    pub detailed: bool,

    /// Skip checking that data paths exist
    #[arg(long)]
    pub skip_paths: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct ScoreArgs {
    /// JSON object mapping sample id to a list of reference reports
    #[arg(value_name = "REFERENCES")]
    pub references: PathBuf,

    /// JSON object mapping sample id to the generated report
    #[arg(value_name = "HYPOTHESES")]
    pub hypotheses: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!(
                "Unknown output format: {}. Valid formats: text, json, yaml",
                s
            )),
        }
    }
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a run configuration
pub fn apply_overrides(config: &mut RunConfig, args: &OverrideArgs) {
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(save_dir) = &args.save_dir {
        config.training.save_dir = save_dir.clone();
    }
    if let Some(resume) = &args.resume {
        config.training.resume = Some(resume.clone());
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    if let Some(batch_size) = args.batch_size {
        config.data.batch_size = batch_size;
    }
}
