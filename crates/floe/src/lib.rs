//! floe: batch job turning catalog and event JSON into partitioned Parquet
//! tables.
//!
//! This crate handles:
//! - Loading job configuration and storage credentials
//! - Resolving each dataset's scan scope to a file list in object storage
//! - Running the catalog and event transforms as SQL on a DataFusion session
//! - Writing the five output tables as hive-partitioned Parquet, with
//!   direct, staged or deferred commit

pub mod cli;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod engine;
pub mod error;
pub mod sink;
pub mod source;
pub mod sql;
pub mod stages;

// Re-export commonly used items
pub use cli::CliArgs;
pub use config::JobConfig;
pub use driver::{RunSummary, run};
pub use error::JobError;

// Re-export from floe-core
pub use floe_core::{MetricsConfig, ParquetCompression, init_metrics, init_tracing};
