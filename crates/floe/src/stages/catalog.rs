//! Catalog stage: items and creators dimension tables.

use std::time::Instant;
use tracing::info;

use floe_core::emit;
use floe_core::metrics::events::StageCompleted;

use crate::engine::EngineSession;
use crate::error::JobError;
use crate::sink::{CREATORS_TABLE, ITEMS_TABLE, TableSink, TableWrite};
use crate::source::DatasetSource;
use crate::sql::{self, CATALOG_VIEW};

/// Tables written by the catalog stage.
#[derive(Debug, Clone)]
pub struct CatalogReport {
    pub items: TableWrite,
    pub creators: TableWrite,
}

/// Load the catalog and write `items_table` and `creators_table`.
pub async fn process_catalog(
    session: &EngineSession,
    catalog: &DatasetSource,
    sink: &mut TableSink,
) -> Result<CatalogReport, JobError> {
    let start = Instant::now();
    info!("Processing catalog data");

    catalog.load(session, CATALOG_VIEW).await?;

    let items = session.sql(ITEMS_TABLE.name, &sql::items_query()).await?;
    let items = sink.write(&ITEMS_TABLE, items).await?;

    let creators = session
        .sql(CREATORS_TABLE.name, &sql::creators_query())
        .await?;
    let creators = sink.write(&CREATORS_TABLE, creators).await?;

    emit!(StageCompleted {
        stage: "catalog",
        duration: start.elapsed(),
    });

    Ok(CatalogReport { items, creators })
}
