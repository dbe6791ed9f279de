//! Metrics infrastructure.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - [`init`]: installs the Prometheus recorder and returns a controller that
//!   renders the snapshot once the job has finished

pub mod events;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::sync::OnceLock;
use tracing::info;

use crate::error::{
    AlreadyInitializedSnafu, MetricsError, PrometheusInitSnafu, WriteTextfileSnafu,
};

/// Histogram buckets for stage and storage durations (in seconds).
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0,
];

static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Handle onto the installed Prometheus recorder.
#[derive(Debug)]
pub struct MetricsController {
    handle: PrometheusHandle,
}

impl MetricsController {
    /// Render every recorded metric in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the rendered snapshot to `path`, replacing any previous file.
    ///
    /// The snapshot is written next to the target and renamed over it so a
    /// collector never reads a half-written file.
    pub fn write_textfile(&self, path: &str) -> Result<(), MetricsError> {
        let temp = format!("{path}.tmp");
        std::fs::write(&temp, self.render()).context(WriteTextfileSnafu { path })?;
        std::fs::rename(&temp, path).context(WriteTextfileSnafu { path })?;
        info!(path, "Wrote metrics snapshot");
        Ok(())
    }
}

/// Install the global Prometheus recorder.
///
/// Must be called at most once per process; metrics emitted before this call
/// (or when it is never called, as in tests) are discarded by the `metrics`
/// facade.
pub fn init() -> Result<&'static MetricsController, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    CONTROLLER
        .set(MetricsController { handle })
        .map_err(|_| AlreadyInitializedSnafu.build())?;

    CONTROLLER
        .get()
        .ok_or_else(|| AlreadyInitializedSnafu.build())
}

/// Macro for emitting metric events.
///
/// Calls [`events::InternalEvent::emit`] on the given event, which records
/// the corresponding Prometheus metric.
///
/// ```ignore
/// use floe_core::emit;
/// use floe_core::metrics::events::RowsWritten;
///
/// emit!(RowsWritten { table: "users_table", rows: 96 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
