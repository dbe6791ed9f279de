//! Internal events for floe metrics emission.
//!
//! Each event struct represents a measurable occurrence in a run. Events
//! implement the `InternalEvent` trait which records the corresponding
//! Prometheus metric. Table and stage names are used as labels; both are
//! fixed, low-cardinality sets.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when a transform stage finishes successfully.
pub struct StageCompleted {
    pub stage: &'static str,
    pub duration: Duration,
}

impl InternalEvent for StageCompleted {
    fn emit(self) {
        trace!(stage = self.stage, duration = ?self.duration, "Stage completed");
        histogram!("floe_stage_duration_seconds", "stage" => self.stage)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when input files are resolved for a dataset scan.
pub struct FilesScanned {
    pub dataset: &'static str,
    pub count: u64,
}

impl InternalEvent for FilesScanned {
    fn emit(self) {
        trace!(dataset = self.dataset, count = self.count, "Files scanned");
        counter!("floe_files_scanned_total", "dataset" => self.dataset).increment(self.count);
    }
}

/// Event emitted when the engine finishes writing a table.
pub struct RowsWritten {
    pub table: &'static str,
    pub rows: u64,
}

impl InternalEvent for RowsWritten {
    fn emit(self) {
        trace!(table = self.table, rows = self.rows, "Rows written");
        counter!("floe_rows_written_total", "table" => self.table).increment(self.rows);
    }
}

/// Event emitted when a table is published at its final location.
pub struct TableCommitted {
    pub table: &'static str,
    pub objects: u64,
}

impl InternalEvent for TableCommitted {
    fn emit(self) {
        trace!(table = self.table, objects = self.objects, "Table committed");
        counter!("floe_tables_committed_total", "table" => self.table).increment(1);
        gauge!("floe_table_objects", "table" => self.table).set(self.objects as f64);
    }
}

/// Event emitted with the outcome of the fact-table join.
pub struct JoinMatched {
    pub matched: u64,
    pub total: u64,
}

impl InternalEvent for JoinMatched {
    fn emit(self) {
        trace!(matched = self.matched, total = self.total, "Join matched");
        gauge!("floe_join_matched_rows").set(self.matched as f64);
        gauge!("floe_join_unmatched_rows").set(self.total.saturating_sub(self.matched) as f64);
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Copy)]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

/// Event emitted once when the job ends.
pub struct RunCompleted {
    pub status: RunStatus,
    pub duration: Duration,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        trace!(status = self.status.as_str(), duration = ?self.duration, "Run completed");
        counter!("floe_runs_total", "status" => self.status.as_str()).increment(1);
        gauge!("floe_run_duration_seconds").set(self.duration.as_secs_f64());
    }
}

/// Types of storage operations.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    List,
    Put,
    Delete,
    Rename,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::List => "list",
            StorageOperation::Put => "put",
            StorageOperation::Delete => "delete",
            StorageOperation::Rename => "rename",
        }
    }
}

/// Request outcome status.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }

    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }
}

/// Event emitted for every storage request issued outside the query engine.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration = ?self.duration,
            "Storage request"
        );
        counter!(
            "floe_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "floe_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
