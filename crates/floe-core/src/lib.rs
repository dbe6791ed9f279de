//! floe-core: storage, configuration and observability primitives for the
//! floe batch job.
//!
//! - `storage/` - Multi-cloud storage abstraction (S3, GCS, Azure, local)
//! - `metrics/` - Prometheus metrics recorded during a run, exported as a textfile
//! - `config/` - Shared configuration types and environment variable interpolation
//! - `tracing` - Log subscriber setup
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod tracing;

// Re-export commonly used items
pub use config::{MetricsConfig, ParquetCompression, interpolate};
pub use error::{ConfigError, MetricsError, StorageError};
pub use metrics::{MetricsController, init as init_metrics};
pub use storage::{BackendConfig, StorageProvider, StorageProviderRef};
pub use tracing::init_tracing;
