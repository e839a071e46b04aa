//! Informe CLI
//!
//! # Usage
//!
//! ```bash
//! # Validate a run configuration (and its data paths)
//! informe validate configs/iu_xray.yaml --detailed
//!
//! # Show the resolved configuration
//! informe info configs/iu_xray.yaml --format yaml --epochs 50
//!
//! # Score generated reports
//! informe score references.json hypotheses.json --format json
//! ```

use clap::Parser;
use informe::config::{
    apply_overrides, load_config, validate_config, validate_paths, Cli, Command, InfoArgs,
    OutputFormat, RunConfig, ScoreArgs, ValidateArgs,
};
use informe::metrics::{Hypotheses, MetricScorer, References};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_directive = if cli.quiet {
        "informe=error"
    } else if cli.verbose {
        "informe=debug"
    } else {
        "informe=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Info(args) => run_info(args),
        Command::Score(args) => run_score(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_with_overrides(
    path: &Path,
    overrides: &informe::config::OverrideArgs,
) -> Result<RunConfig, String> {
    let mut config = load_config(path).map_err(|e| e.to_string())?;
    apply_overrides(&mut config, overrides);
    validate_config(&config).map_err(|e| format!("Validation failed: {e}"))?;
    Ok(config)
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    tracing::info!(config = %args.config.display(), "validating config");

    let config = load_with_overrides(&args.config, &args.overrides)?;
    if !args.skip_paths {
        validate_paths(&config).map_err(|e| format!("Validation failed: {e}"))?;
    }

    println!("Configuration is valid");

    if args.detailed {
        println!();
        println!("Configuration Summary:");
        println!("  Dataset: {}", config.dataset_name);
        println!("  Images: {}", config.data.image_dir.display());
        println!("  Annotations: {}", config.data.ann_path.display());
        println!("  Max sequence length: {}", config.data.max_seq_length);
        println!("  Batch size: {}", config.data.batch_size);
        println!();
        println!("  Optimizer: {}", config.optimizer.name);
        println!("  Learning rate (visual extractor): {}", config.optimizer.lr_ve);
        println!("  Learning rate (encoder-decoder): {}", config.optimizer.lr_ed);
        println!("  Weight decay: {}", config.optimizer.weight_decay);
        println!("  AMSGrad: {}", config.optimizer.amsgrad);
        println!(
            "  Scheduler: {} (step_size={}, gamma={}, per {:?})",
            config.scheduler.name,
            config.scheduler.step_size,
            config.scheduler.gamma,
            config.scheduler.interval
        );
        println!();
        println!(
            "  Decoding: {:?} (beam_size={}, sample_n={})",
            config.decoding.sample_method, config.decoding.beam_size, config.decoding.sample_n
        );
        println!();
        println!("  Epochs: {}", config.training.epochs);
        println!(
            "  Monitor: {} {} (early stop after {})",
            config.training.monitor_mode, config.training.monitor_metric, config.training.early_stop
        );
        if let Some(clip) = config.training.grad_clip_value {
            println!("  Gradient clipping: {clip}");
        }
        println!("  Save dir: {}", config.training.save_dir.display());
        if let Some(resume) = &config.training.resume {
            println!("  Resume from: {}", resume.display());
        }
    }

    Ok(())
}

fn run_info(args: InfoArgs) -> Result<(), String> {
    let config = load_with_overrides(&args.config, &args.overrides)?;

    match args.format {
        OutputFormat::Text => {
            println!("Dataset: {}", config.dataset_name);
            println!(
                "Optimizer: {} (lr_ve={}, lr_ed={})",
                config.optimizer.name, config.optimizer.lr_ve, config.optimizer.lr_ed
            );
            println!("Scheduler: {}", config.scheduler.name);
            println!("Epochs: {}", config.training.epochs);
            println!("Batch size: {}", config.data.batch_size);
            println!(
                "Monitor: {} ({})",
                config.training.monitor_metric, config.training.monitor_mode
            );
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&config)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {e}", path.display()))
}

fn run_score(args: ScoreArgs) -> Result<(), String> {
    let references: References = read_json(&args.references)?;
    let hypotheses: Hypotheses = read_json(&args.hypotheses)?;
    tracing::debug!(samples = references.len(), "scoring");

    let report = MetricScorer::new()
        .score(&references, &hypotheses)
        .map_err(|e| e.to_string())?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&report)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
        OutputFormat::Text => {
            for (name, value) in report.iter() {
                println!("{name:>8}: {value:.4}");
            }
        }
    }

    Ok(())
}
