//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;

use crate::config::JobConfig;
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(version, about = "Turn catalog and event JSON into partitioned Parquet tables")]
pub struct CliArgs {
    /// Path to the job configuration file. Built-in defaults apply without one.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the input root URL
    #[arg(long)]
    pub input_root: Option<String>,

    /// Override the output root URL
    #[arg(long)]
    pub output_root: Option<String>,
}

impl CliArgs {
    /// Load the job configuration and apply the root overrides.
    pub fn load_config(&self) -> Result<JobConfig, ConfigError> {
        let config = match &self.config {
            Some(path) => JobConfig::from_file(path)?,
            None => JobConfig::default(),
        }
        .with_roots(self.input_root.clone(), self.output_root.clone());

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_uses_defaults() {
        let args = CliArgs::parse_from(["floe"]);
        let config = args.load_config().unwrap();
        assert_eq!(config, JobConfig::default());
    }

    #[test]
    fn test_root_overrides() {
        let args = CliArgs::parse_from([
            "floe",
            "--input-root",
            "/data/raw",
            "--output-root",
            "file:///data/lake",
        ]);
        let config = args.load_config().unwrap();
        assert_eq!(config.input_root, "/data/raw");
        assert_eq!(config.output_root, "file:///data/lake");
    }

    #[test]
    fn test_empty_override_is_rejected() {
        let args = CliArgs::parse_from(["floe", "--output-root", ""]);
        assert!(matches!(
            args.load_config(),
            Err(ConfigError::EmptyOutputRoot)
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let args = CliArgs::parse_from(["floe", "-c", "/nonexistent/floe.yaml"]);
        assert!(matches!(
            args.load_config(),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
