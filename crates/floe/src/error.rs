//! Error types for the floe batch job.

use datafusion::error::DataFusionError;
use snafu::prelude::*;

// Re-export common errors
pub use floe_core::error::{ConfigError, MetricsError, StorageError};

/// Errors that can occur while loading storage credentials.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CredentialsError {
    /// The credential file is missing or not valid INI.
    #[snafu(display("Failed to read credential file {path}: {source}"))]
    ReadCredentialFile {
        path: String,
        source: config::ConfigError,
    },

    /// The credential file has no section with the requested name.
    #[snafu(display("Credential file {path} has no [{section}] section"))]
    MissingSection { path: String, section: String },

    /// A required key is absent from the section.
    #[snafu(display("Credential file {path} section [{section}] is missing {key}"))]
    MissingKey {
        path: String,
        section: String,
        key: String,
    },
}

/// Errors raised by the query engine session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    /// Invalid engine configuration option.
    #[snafu(display("Invalid engine configuration: {source}"))]
    SessionConfig { source: DataFusionError },

    /// Failed to build or register a storage backend.
    #[snafu(display("Failed to set up storage for {url}: {source}"))]
    StorageSetup { url: String, source: StorageError },

    /// Failed to load a dataset into a dataframe.
    #[snafu(display("Failed to read dataset '{dataset}': {source}"))]
    Read {
        dataset: String,
        source: DataFusionError,
    },

    /// Failed to register or plan a query.
    #[snafu(display("Failed to plan query '{name}': {source}"))]
    Query {
        name: String,
        source: DataFusionError,
    },

    /// Failed while executing a query or writing its result.
    #[snafu(display("Failed to execute '{name}': {source}"))]
    Execute {
        name: String,
        source: DataFusionError,
    },
}

/// Errors that can occur while resolving a dataset's input files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to list objects under the dataset path.
    #[snafu(display("Failed to list dataset '{dataset}': {source}"))]
    List {
        dataset: String,
        source: StorageError,
    },

    /// A scan pattern is not a valid glob.
    #[snafu(display("Invalid scan pattern '{pattern}': {source}"))]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// The scan scope matched no input file.
    #[snafu(display("No input files matched dataset '{dataset}' under {url}"))]
    EmptyScan { dataset: String, url: String },

    /// Failed to load the resolved files.
    #[snafu(display("Failed to load dataset: {source}"))]
    Load { source: EngineError },
}

/// Errors that can occur while writing or committing an output table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// The destination holds data and the write mode forbids replacing it.
    #[snafu(display("Destination table '{table}' already exists at {url}"))]
    DestinationExists { table: String, url: String },

    /// Failed to inspect the destination.
    #[snafu(display("Failed to inspect table '{table}': {source}"))]
    Inspect {
        table: String,
        source: StorageError,
    },

    /// The engine failed to write the table.
    #[snafu(display("Failed to write table '{table}': {source}"))]
    WriteTable { table: String, source: EngineError },

    /// Failed to clear the previous contents of a location.
    #[snafu(display("Failed to clear {prefix}: {source}"))]
    Clear {
        prefix: String,
        source: StorageError,
    },

    /// Failed to move staged output into place.
    #[snafu(display("Failed to promote table '{table}': {source}"))]
    Promote {
        table: String,
        source: StorageError,
    },

    /// Failed to write the completion marker.
    #[snafu(display("Failed to write success marker for '{table}': {source}"))]
    Marker {
        table: String,
        source: StorageError,
    },
}

/// Top-level job errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Credentials error.
    #[snafu(display("Credentials error: {source}"))]
    Credentials { source: CredentialsError },

    /// Engine error.
    #[snafu(display("Engine error: {source}"))]
    Engine { source: EngineError },

    /// Source error.
    #[snafu(display("Source error: {source}"))]
    Source { source: SourceError },

    /// Sink error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl From<ConfigError> for JobError {
    fn from(source: ConfigError) -> Self {
        JobError::Config { source }
    }
}

impl From<CredentialsError> for JobError {
    fn from(source: CredentialsError) -> Self {
        JobError::Credentials { source }
    }
}

impl From<EngineError> for JobError {
    fn from(source: EngineError) -> Self {
        JobError::Engine { source }
    }
}

impl From<SourceError> for JobError {
    fn from(source: SourceError) -> Self {
        JobError::Source { source }
    }
}

impl From<SinkError> for JobError {
    fn from(source: SinkError) -> Self {
        JobError::Sink { source }
    }
}

impl From<MetricsError> for JobError {
    fn from(source: MetricsError) -> Self {
        JobError::Metrics { source }
    }
}
