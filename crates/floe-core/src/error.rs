//! Common error types shared by the floe crates.
//!
//! Storage, configuration and metrics failures live here so that the job
//! crate can wrap them without depending on backend details.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// The backend URL could not be expressed as a URL for the query engine.
    #[snafu(display("Invalid engine URL '{url}': {source}"))]
    EngineUrl {
        url: String,
        source: url::ParseError,
    },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },

    /// Azure configuration error.
    #[snafu(display("Azure configuration error: {source}"))]
    AzureConfig { source: object_store::Error },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input root is empty.
    #[snafu(display("input_root cannot be empty"))]
    EmptyInputRoot,

    /// Output root is empty.
    #[snafu(display("output_root cannot be empty"))]
    EmptyOutputRoot,

    /// A dataset has no scan patterns.
    #[snafu(display("Dataset '{dataset}' must list at least one scan pattern"))]
    EmptyScanScope { dataset: String },

    /// A scan pattern is not a valid glob.
    #[snafu(display("Dataset '{dataset}' has invalid scan pattern '{pattern}': {message}"))]
    InvalidScanPattern {
        dataset: String,
        pattern: String,
        message: String,
    },

    /// Schema has conflicting options.
    #[snafu(display(
        "Dataset '{dataset}' has invalid schema: cannot specify both 'infer: true' and 'fields'"
    ))]
    SchemaConflict { dataset: String },

    /// The id-based join strategy needs to know which event column carries the item id.
    #[snafu(display("join strategy 'item_id' requires 'event_item_column'"))]
    MissingJoinColumn,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization and export.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics recorder already installed (double-init attempted).
    #[snafu(display("Metrics recorder already initialized"))]
    AlreadyInitialized,

    /// Failed to write the metrics textfile.
    #[snafu(display("Failed to write metrics textfile {path}: {source}"))]
    WriteTextfile {
        path: String,
        source: std::io::Error,
    },
}
