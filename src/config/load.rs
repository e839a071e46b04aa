//! Loading a run configuration from YAML

use super::schema::RunConfig;
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Load and validate a run configuration
///
/// # Example
///
/// ```no_run
/// use informe::config::load_config;
///
/// let config = load_config("configs/iu_xray.yaml")?;
/// println!("monitoring {}", config.training.monitor_metric);
/// # Ok::<(), informe::Error>(())
/// ```
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<RunConfig> {
    let yaml_content = fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;

    parse_config(&yaml_content)
}

/// Parse and validate a YAML document
pub fn parse_config(yaml: &str) -> Result<RunConfig> {
    let config: RunConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

    validate_config(&config).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;

    Ok(config)
}
