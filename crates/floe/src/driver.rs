//! Job driver.
//!
//! Runs the catalog stage, then the event stage, on one engine session and
//! publishes whatever the commit mode left pending. Any failure stops the
//! run; staged output of the failed run is removed, published tables are
//! left as they are.

use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

use floe_core::emit;
use floe_core::metrics::events::{RunCompleted, RunStatus};

use crate::config::JobConfig;
use crate::engine::EngineSession;
use crate::error::JobError;
use crate::sink::{TableSink, TableWrite};
use crate::source::DatasetSource;
use crate::stages::{
    CatalogReport, EventsReport, JoinStats, process_catalog, process_events,
};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    /// The five output tables in the order they were written.
    pub tables: Vec<TableWrite>,
    pub join: Option<JoinStats>,
    pub duration: Duration,
}

/// Unique, sortable id of a run; names its staging directory.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Run the whole job.
pub async fn run(config: &JobConfig) -> Result<RunSummary, JobError> {
    let start = Instant::now();
    let result = execute(config, start).await;

    let status = match &result {
        Ok(_) => RunStatus::Success,
        Err(e) => {
            error!(error = %e, "Run failed");
            RunStatus::Failed
        }
    };
    emit!(RunCompleted {
        status,
        duration: start.elapsed(),
    });

    result
}

async fn execute(config: &JobConfig, start: Instant) -> Result<RunSummary, JobError> {
    config.validate()?;

    let credentials = config.credentials.load()?;
    let session = EngineSession::create(
        &config.engine,
        &config.input_root,
        &config.output_root,
        &credentials,
    )
    .await?;

    let catalog = DatasetSource::new(config.catalog_scope())?;
    let events = DatasetSource::new(config.events_scope())?;

    let run_id = new_run_id();
    info!(
        run_id = %run_id,
        input = %config.input_root,
        output = %config.output_root,
        commit = ?config.output.commit,
        "Starting run"
    );

    let mut sink = TableSink::new(session.clone(), &config.output, run_id.clone());
    let (catalog_report, events_report) =
        match run_stages(&session, &catalog, &events, config, &mut sink).await {
            Ok(reports) => reports,
            Err(e) => {
                sink.discard().await;
                return Err(e);
            }
        };

    let tables = [
        catalog_report.items,
        catalog_report.creators,
        events_report.users,
        events_report.time,
        events_report.activity_facts,
    ]
    .into_iter()
    .map(|table| TableWrite {
        committed: true,
        ..table
    })
    .collect();

    let summary = RunSummary {
        run_id,
        tables,
        join: events_report.join,
        duration: start.elapsed(),
    };
    info!(
        run_id = %summary.run_id,
        duration = ?summary.duration,
        "Run completed"
    );
    Ok(summary)
}

async fn run_stages(
    session: &EngineSession,
    catalog: &DatasetSource,
    events: &DatasetSource,
    config: &JobConfig,
    sink: &mut TableSink,
) -> Result<(CatalogReport, EventsReport), JobError> {
    let catalog_report = process_catalog(session, catalog, sink).await?;
    let events_report = process_events(session, events, catalog, &config.join, sink).await?;

    let committed = sink.finish().await?;
    if !committed.is_empty() {
        info!(tables = ?committed, "Committed deferred tables");
    }

    Ok((catalog_report, events_report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique_and_path_safe() {
        let a = new_run_id();
        let b = new_run_id();

        assert_ne!(a, b);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        );
    }
}
