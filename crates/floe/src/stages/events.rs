//! Event stage: users and time dimensions plus the activity fact table.

use datafusion::arrow::array::{AsArray, RecordBatch};
use datafusion::arrow::datatypes::Int64Type;
use std::time::Instant;
use tracing::{info, warn};

use floe_core::emit;
use floe_core::metrics::events::{JoinMatched, StageCompleted};

use crate::config::JoinConfig;
use crate::engine::EngineSession;
use crate::error::JobError;
use crate::sink::{ACTIVITY_FACTS_TABLE, TIME_TABLE, TableSink, TableWrite, USERS_TABLE};
use crate::source::DatasetSource;
use crate::sql::{
    self, ACTIVITY_FACTS_VIEW, CATALOG_LOOKUP_VIEW, PLAYED_EVENTS_VIEW, RAW_EVENTS_VIEW,
};

/// Matched and total rows of the fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinStats {
    pub matched: u64,
    pub total: u64,
}

impl JoinStats {
    /// Fraction of fact rows with a catalog match, 0 for an empty table.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

/// Tables written by the event stage.
#[derive(Debug, Clone)]
pub struct EventsReport {
    pub users: TableWrite,
    pub time: TableWrite,
    pub activity_facts: TableWrite,
    /// Present when match-rate reporting is enabled.
    pub join: Option<JoinStats>,
}

/// Load events, keep playbacks and write `users_table`, `time_table` and
/// `activity_facts_table`.
///
/// The catalog is read again into its own view for the fact join; nothing
/// from the catalog stage is reused.
pub async fn process_events(
    session: &EngineSession,
    events: &DatasetSource,
    catalog: &DatasetSource,
    join: &JoinConfig,
    sink: &mut TableSink,
) -> Result<EventsReport, JobError> {
    let start = Instant::now();
    info!("Processing event data");

    events.load(session, RAW_EVENTS_VIEW).await?;
    let played = session
        .sql(PLAYED_EVENTS_VIEW, &sql::played_events_query())
        .await?;
    session.register_view(PLAYED_EVENTS_VIEW, played)?;

    let users = session.sql(USERS_TABLE.name, &sql::users_query()).await?;
    let users = sink.write(&USERS_TABLE, users).await?;

    let time = session.sql(TIME_TABLE.name, &sql::time_query()).await?;
    let time = sink.write(&TIME_TABLE, time).await?;

    catalog.load(session, CATALOG_LOOKUP_VIEW).await?;

    let condition = sql::join_condition(join.strategy, join.event_item_column.as_deref());
    info!(strategy = ?join.strategy, "Joining events to catalog");
    let facts = session
        .sql(
            ACTIVITY_FACTS_TABLE.name,
            &sql::activity_facts_query(&condition),
        )
        .await?;

    // Count and write read the same materialised rows.
    let facts = if join.report_match_rate {
        let facts = session.cache(ACTIVITY_FACTS_TABLE.name, facts).await?;
        session.register_view(ACTIVITY_FACTS_VIEW, facts.clone())?;
        facts
    } else {
        facts
    };
    let activity_facts = sink.write(&ACTIVITY_FACTS_TABLE, facts).await?;

    let join_stats = if join.report_match_rate {
        Some(measure_join(session).await?)
    } else {
        None
    };

    emit!(StageCompleted {
        stage: "events",
        duration: start.elapsed(),
    });

    Ok(EventsReport {
        users,
        time,
        activity_facts,
        join: join_stats,
    })
}

/// Count fact rows with and without a catalog match.
async fn measure_join(session: &EngineSession) -> Result<JoinStats, JobError> {
    let df = session
        .sql(ACTIVITY_FACTS_VIEW, &sql::match_rate_query())
        .await?;
    let batches = session.collect(ACTIVITY_FACTS_VIEW, df).await?;

    let stats = JoinStats {
        matched: count_column(&batches, "matched"),
        total: count_column(&batches, "total"),
    };

    emit!(JoinMatched {
        matched: stats.matched,
        total: stats.total,
    });

    if stats.total > 0 && stats.matched == 0 {
        warn!(
            total = stats.total,
            "No fact row matched the catalog; item_id and parent_id are null throughout"
        );
    } else {
        info!(
            matched = stats.matched,
            total = stats.total,
            rate = %format!("{:.2}%", stats.rate() * 100.0),
            "Fact join match rate"
        );
    }

    Ok(stats)
}

fn count_column(batches: &[RecordBatch], name: &str) -> u64 {
    batches
        .iter()
        .filter_map(|batch| batch.column_by_name(name))
        .filter_map(|column| column.as_primitive_opt::<Int64Type>())
        .flat_map(|counts| counts.iter().flatten())
        .map(|count| count.max(0) as u64)
        .sum()
}
