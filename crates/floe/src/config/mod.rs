//! Configuration for the floe batch job.
//!
//! Every setting has a default, so a run with no config file reads the
//! public sample bucket and writes to the default lake bucket with
//! credentials from `dl.cfg`.

mod schema;

pub use schema::{FieldConfig, FieldType, SchemaConfig, catalog_schema, event_schema};

use datafusion::arrow::datatypes::SchemaRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::credentials::CredentialSource;
use crate::error::ConfigError;
pub use floe_core::config::{MetricsConfig, ParquetCompression, interpolate};

pub const DEFAULT_INPUT_ROOT: &str = "s3a://udacity-dend/";
pub const DEFAULT_OUTPUT_ROOT: &str = "s3a://spark-data-lake-proj4/";

/// The two input datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Catalog,
    Events,
}

impl Dataset {
    pub fn name(self) -> &'static str {
        match self {
            Dataset::Catalog => "catalog",
            Dataset::Events => "events",
        }
    }

    fn default_path(self) -> &'static str {
        match self {
            Dataset::Catalog => "catalog_data",
            Dataset::Events => "event_data",
        }
    }

    fn default_scan(self) -> Vec<String> {
        let pattern = match self {
            Dataset::Catalog => "A/A/*",
            Dataset::Events => "*/*",
        };
        vec![pattern.to_string()]
    }

    fn builtin_schema(self) -> fn() -> SchemaRef {
        match self {
            Dataset::Catalog => catalog_schema,
            Dataset::Events => event_schema,
        }
    }
}

/// Configuration of one input dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Directory below the input root.
    #[serde(default)]
    pub path: Option<String>,
    /// Glob patterns relative to `path`. A pattern selects every file it
    /// matches and every file below a directory it matches.
    #[serde(default)]
    pub scan: Option<Vec<String>>,
    /// Only files with this suffix are read.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// Schema to read the records with.
    #[serde(default)]
    pub schema: SchemaConfig,
}

fn default_file_extension() -> String {
    ".json".to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            scan: None,
            file_extension: default_file_extension(),
            schema: SchemaConfig::default(),
        }
    }
}

impl DatasetConfig {
    /// Resolve the configured values against the dataset's defaults.
    pub fn scope(&self, dataset: Dataset) -> ScanScope {
        ScanScope {
            dataset,
            path: self
                .path
                .as_deref()
                .unwrap_or(dataset.default_path())
                .trim_matches('/')
                .to_string(),
            patterns: self.scan.clone().unwrap_or_else(|| dataset.default_scan()),
            file_extension: self.file_extension.clone(),
            schema: self.schema.resolve(dataset.builtin_schema()),
        }
    }

    fn validate(&self, dataset: Dataset) -> Result<(), ConfigError> {
        let name = dataset.name();
        if let Some(patterns) = &self.scan {
            if patterns.is_empty() {
                return Err(ConfigError::EmptyScanScope {
                    dataset: name.to_string(),
                });
            }
            for pattern in patterns {
                if let Err(e) = glob::Pattern::new(pattern) {
                    return Err(ConfigError::InvalidScanPattern {
                        dataset: name.to_string(),
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        if self.schema.infer && !self.schema.fields.is_empty() {
            return Err(ConfigError::SchemaConflict {
                dataset: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Fully resolved scan scope of a dataset.
#[derive(Debug, Clone)]
pub struct ScanScope {
    pub dataset: Dataset,
    /// Directory below the input root, without surrounding slashes.
    pub path: String,
    pub patterns: Vec<String>,
    pub file_extension: String,
    /// `None` means the engine infers the schema.
    pub schema: Option<SchemaRef>,
}

/// How event rows are matched to catalog rows in the fact table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Creator name and item title must be byte-for-byte equal.
    #[default]
    Exact,
    /// Compare trimmed, lower-cased creator name and title.
    Normalized,
    /// Join an event column holding the item id to the catalog item id.
    ItemId,
}

/// Fact-table join configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JoinConfig {
    #[serde(default)]
    pub strategy: JoinStrategy,
    /// Event column compared to the catalog item id under `item_id`.
    #[serde(default)]
    pub event_item_column: Option<String>,
    /// Count matched fact rows and report the rate. The fact rows are held
    /// in memory between the count and the write.
    #[serde(default = "default_report_match_rate")]
    pub report_match_rate: bool,
}

fn default_report_match_rate() -> bool {
    true
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            strategy: JoinStrategy::default(),
            event_item_column: None,
            report_match_rate: default_report_match_rate(),
        }
    }
}

/// What to do when a destination table already holds data.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the previous contents entirely.
    #[default]
    Overwrite,
    /// Fail the run.
    ErrorIfExists,
}

/// How written tables are published.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Clear the destination and write into it.
    Direct,
    /// Write under the staging area, then swap each table in once written.
    #[default]
    Staged,
    /// Stage every table and swap them all in after both stages succeed.
    Deferred,
}

/// Output table configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub commit: CommitMode,
    #[serde(default)]
    pub compression: ParquetCompression,
}

/// Query engine tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of partitions the engine plans scans and joins with.
    #[serde(default)]
    pub target_partitions: Option<usize>,
    /// Raw engine settings, e.g. `datafusion.execution.batch_size: "4096"`.
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Main configuration for a floe run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Root URL holding `catalog.path` and `events.path`.
    #[serde(default = "default_input_root")]
    pub input_root: String,
    /// Root URL the five output tables are written under.
    #[serde(default = "default_output_root")]
    pub output_root: String,
    #[serde(default)]
    pub credentials: CredentialSource,
    #[serde(default)]
    pub catalog: DatasetConfig,
    #[serde(default)]
    pub events: DatasetConfig,
    #[serde(default)]
    pub join: JoinConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_input_root() -> String {
    DEFAULT_INPUT_ROOT.to_string()
}

fn default_output_root() -> String {
    DEFAULT_OUTPUT_ROOT.to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input_root: default_input_root(),
            output_root: default_output_root(),
            credentials: CredentialSource::default(),
            catalog: DatasetConfig::default(),
            events: DatasetConfig::default(),
            join: JoinConfig::default(),
            output: OutputConfig::default(),
            engine: EngineConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl JobConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config: JobConfig = serde_yaml::from_str(&result.text)
            .map_err(|source| ConfigError::YamlParse { source })?;

        config.validate()?;

        Ok(config)
    }

    /// Replace the roots with values given on the command line.
    pub fn with_roots(mut self, input_root: Option<String>, output_root: Option<String>) -> Self {
        if let Some(root) = input_root {
            self.input_root = root;
        }
        if let Some(root) = output_root {
            self.output_root = root;
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_root.is_empty() {
            return Err(ConfigError::EmptyInputRoot);
        }
        if self.output_root.is_empty() {
            return Err(ConfigError::EmptyOutputRoot);
        }
        self.catalog.validate(Dataset::Catalog)?;
        self.events.validate(Dataset::Events)?;
        if self.join.strategy == JoinStrategy::ItemId
            && self
                .join
                .event_item_column
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingJoinColumn);
        }
        Ok(())
    }

    pub fn catalog_scope(&self) -> ScanScope {
        self.catalog.scope(Dataset::Catalog)
    }

    pub fn events_scope(&self) -> ScanScope {
        self.events.scope(Dataset::Events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = JobConfig::parse("{}").unwrap();
        assert_eq!(config, JobConfig::default());
        assert_eq!(config.input_root, "s3a://udacity-dend/");
        assert_eq!(config.output_root, "s3a://spark-data-lake-proj4/");
        assert_eq!(config.output.commit, CommitMode::Staged);
        assert_eq!(config.output.write_mode, WriteMode::Overwrite);
        assert_eq!(config.join.strategy, JoinStrategy::Exact);
        assert!(config.join.report_match_rate);

        let catalog = config.catalog_scope();
        assert_eq!(catalog.path, "catalog_data");
        assert_eq!(catalog.patterns, vec!["A/A/*"]);
        assert_eq!(catalog.file_extension, ".json");
        assert!(catalog.schema.is_some());

        let events = config.events_scope();
        assert_eq!(events.path, "event_data");
        assert_eq!(events.patterns, vec!["*/*"]);
    }

    #[test]
    fn test_dataset_default_matches_yaml_default() {
        let parsed: DatasetConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(parsed, DatasetConfig::default());
        assert_eq!(DatasetConfig::default().file_extension, ".json");

        let scope = DatasetConfig::default().scope(Dataset::Catalog);
        assert_eq!(scope.file_extension, ".json");
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
input_root: /data/raw
output_root: gs://lake/sparkify
credentials:
  type: environment
catalog:
  path: /catalog_data/
  scan: ["**/*"]
events:
  schema:
    infer: true
join:
  strategy: normalized
  report_match_rate: false
output:
  write_mode: error_if_exists
  commit: deferred
  compression: zstd
engine:
  target_partitions: 4
  options:
    datafusion.execution.batch_size: "4096"
metrics:
  textfile: /tmp/floe.prom
"#;
        let config = JobConfig::parse(yaml).unwrap();

        assert_eq!(config.credentials, CredentialSource::Environment);
        assert_eq!(config.catalog_scope().path, "catalog_data");
        assert_eq!(config.catalog_scope().patterns, vec!["**/*"]);
        assert!(config.events_scope().schema.is_none());
        assert_eq!(config.join.strategy, JoinStrategy::Normalized);
        assert!(!config.join.report_match_rate);
        assert_eq!(config.output.write_mode, WriteMode::ErrorIfExists);
        assert_eq!(config.output.commit, CommitMode::Deferred);
        assert_eq!(config.output.compression, ParquetCompression::Zstd);
        assert_eq!(config.engine.target_partitions, Some(4));
        assert_eq!(
            config.engine.options["datafusion.execution.batch_size"],
            "4096"
        );
        assert_eq!(config.metrics.textfile.as_deref(), Some("/tmp/floe.prom"));
    }

    #[test]
    fn test_env_interpolation() {
        // SAFETY: test-only env var with a unique name
        unsafe { std::env::set_var("FLOE_TEST_OUTPUT_ROOT", "/tmp/floe-out") };
        let config = JobConfig::parse("output_root: ${FLOE_TEST_OUTPUT_ROOT}").unwrap();
        assert_eq!(config.output_root, "/tmp/floe-out");

        let err = JobConfig::parse("output_root: ${FLOE_TEST_UNSET_ROOT}").unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = JobConfig::parse("output:\n  mode: overwrite\n").unwrap_err();
        assert!(matches!(err, ConfigError::YamlParse { .. }));
    }

    #[test]
    fn test_validation_errors() {
        let err = JobConfig::parse("input_root: \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyInputRoot));

        let err = JobConfig::parse("events:\n  scan: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyScanScope { .. }));

        let err = JobConfig::parse("catalog:\n  scan: [\"A/[\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScanPattern { .. }));

        let yaml = "catalog:\n  schema:\n    infer: true\n    fields:\n      - name: song_id\n        type: string\n";
        let err = JobConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaConflict { .. }));

        let err = JobConfig::parse("join:\n  strategy: item_id\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingJoinColumn));

        let config =
            JobConfig::parse("join:\n  strategy: item_id\n  event_item_column: song_id\n")
                .unwrap();
        assert_eq!(config.join.strategy, JoinStrategy::ItemId);
    }

    #[test]
    fn test_cli_roots_override() {
        let config = JobConfig::default()
            .with_roots(Some("/data/raw".to_string()), None);
        assert_eq!(config.input_root, "/data/raw");
        assert_eq!(config.output_root, DEFAULT_OUTPUT_ROOT);
    }
}
