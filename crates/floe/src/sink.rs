//! Output table writing and commit.
//!
//! Each table lives in its own directory under the output root. Depending on
//! the commit mode the engine writes either straight into that directory or
//! into a per-run staging area that is swapped in afterwards:
//!
//! ```text
//! output_root/
//! ├── _staging/{run_id}/{table}/   # staged output (staged/deferred commit)
//! ├── items_table/
//! │   ├── year=2000/parent_id=AR1/{uuid}.parquet
//! │   └── _SUCCESS
//! └── ...
//! ```
//!
//! A table directory is always cleared before new data lands in it, so a
//! rerun replaces the previous contents instead of adding to them.

use datafusion::prelude::DataFrame;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::time::Instant;
use tracing::{info, warn};

use floe_core::metrics::events::{RowsWritten, TableCommitted};
use floe_core::{StorageProviderRef, emit};

use crate::config::{CommitMode, OutputConfig, WriteMode};
use crate::engine::EngineSession;
use crate::error::{
    ClearSnafu, DestinationExistsSnafu, InspectSnafu, MarkerSnafu, PromoteSnafu, SinkError,
    WriteTableSnafu,
};

/// Directory under the output root holding staged tables.
pub const STAGING_DIR: &str = "_staging";

/// Marker written into a table directory once it is committed.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Name and layout of an output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub partition_by: &'static [&'static str],
}

pub const ITEMS_TABLE: TableSpec = TableSpec {
    name: "items_table",
    partition_by: &["year", "parent_id"],
};

pub const CREATORS_TABLE: TableSpec = TableSpec {
    name: "creators_table",
    partition_by: &[],
};

pub const USERS_TABLE: TableSpec = TableSpec {
    name: "users_table",
    partition_by: &[],
};

pub const TIME_TABLE: TableSpec = TableSpec {
    name: "time_table",
    partition_by: &["year", "month"],
};

pub const ACTIVITY_FACTS_TABLE: TableSpec = TableSpec {
    name: "activity_facts_table",
    partition_by: &["year", "month"],
};

/// Every output table, in the order they are produced.
pub const ALL_TABLES: [TableSpec; 5] = [
    ITEMS_TABLE,
    CREATORS_TABLE,
    USERS_TABLE,
    TIME_TABLE,
    ACTIVITY_FACTS_TABLE,
];

/// Outcome of writing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWrite {
    pub table: &'static str,
    pub rows: u64,
    /// Whether the table is already published at its final location.
    pub committed: bool,
}

/// Writes tables under the output root and publishes them.
#[derive(Debug)]
pub struct TableSink {
    session: EngineSession,
    storage: StorageProviderRef,
    config: OutputConfig,
    run_id: String,
    pending: Vec<TableSpec>,
}

impl TableSink {
    pub fn new(session: EngineSession, config: &OutputConfig, run_id: impl Into<String>) -> Self {
        let storage = session.output().clone();
        Self {
            session,
            storage,
            config: config.clone(),
            run_id: run_id.into(),
            pending: Vec::new(),
        }
    }

    fn staging_prefix(&self) -> String {
        format!("{STAGING_DIR}/{}", self.run_id)
    }

    fn staged_table_prefix(&self, table: &TableSpec) -> String {
        format!("{}/{}", self.staging_prefix(), table.name)
    }

    /// Fail when the destination holds data and the write mode forbids it.
    async fn check_destination(&self, table: &TableSpec) -> Result<(), SinkError> {
        if self.config.write_mode != WriteMode::ErrorIfExists {
            return Ok(());
        }

        let exists = self
            .storage
            .has_objects(table.name)
            .await
            .context(InspectSnafu { table: table.name })?;

        ensure!(
            !exists,
            DestinationExistsSnafu {
                table: table.name,
                url: self.storage.engine_url(table.name),
            }
        );
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> Result<(), SinkError> {
        let deleted = self
            .storage
            .delete_prefix(prefix)
            .await
            .context(ClearSnafu { prefix })?;
        if deleted > 0 {
            info!(prefix, deleted, "Cleared previous contents");
        }
        Ok(())
    }

    /// Write `df` as `table`.
    ///
    /// With `direct` and `staged` commit the table is published before this
    /// returns; with `deferred` it waits for [`TableSink::finish`].
    pub async fn write(&mut self, table: &TableSpec, df: DataFrame) -> Result<TableWrite, SinkError> {
        self.check_destination(table).await?;

        let target = match self.config.commit {
            CommitMode::Direct => {
                self.clear(table.name).await?;
                table.name.to_string()
            }
            CommitMode::Staged | CommitMode::Deferred => {
                let staged = self.staged_table_prefix(table);
                self.clear(&staged).await?;
                staged
            }
        };
        let url = self.storage.engine_url(&format!("{target}/"));

        info!(table = table.name, url = %url, "Writing table");
        let start = Instant::now();
        let rows = self
            .session
            .write_parquet(
                table.name,
                df,
                &url,
                table.partition_by,
                self.config.compression,
            )
            .await
            .context(WriteTableSnafu { table: table.name })?;

        emit!(RowsWritten {
            table: table.name,
            rows,
        });
        info!(table = table.name, rows, elapsed = ?start.elapsed(), "Wrote table");

        let committed = match self.config.commit {
            CommitMode::Direct => {
                let objects = self
                    .storage
                    .list_with_prefix(table.name)
                    .await
                    .context(InspectSnafu { table: table.name })?
                    .len();
                self.mark_success(table).await?;
                emit!(TableCommitted {
                    table: table.name,
                    objects: objects as u64,
                });
                true
            }
            CommitMode::Staged => {
                self.promote(table).await?;
                true
            }
            CommitMode::Deferred => {
                self.pending.push(*table);
                false
            }
        };

        Ok(TableWrite {
            table: table.name,
            rows,
            committed,
        })
    }

    /// Replace the published table with its staged copy.
    async fn promote(&self, table: &TableSpec) -> Result<(), SinkError> {
        self.clear(table.name).await?;

        let objects = self
            .storage
            .promote_prefix(&self.staged_table_prefix(table), table.name)
            .await
            .context(PromoteSnafu { table: table.name })?;

        self.mark_success(table).await?;

        emit!(TableCommitted {
            table: table.name,
            objects: objects as u64,
        });
        info!(table = table.name, objects, "Committed table");
        Ok(())
    }

    async fn mark_success(&self, table: &TableSpec) -> Result<(), SinkError> {
        let marker = Path::from(format!("{}/{SUCCESS_MARKER}", table.name));
        self.storage
            .put_payload(&marker, PutPayload::new())
            .await
            .context(MarkerSnafu { table: table.name })
    }

    /// Publish every table still waiting for commit and remove this run's
    /// staging area.
    pub async fn finish(&mut self) -> Result<Vec<&'static str>, SinkError> {
        let pending = std::mem::take(&mut self.pending);
        let mut committed = Vec::with_capacity(pending.len());

        for table in &pending {
            self.promote(table).await?;
            committed.push(table.name);
        }

        if self.config.commit != CommitMode::Direct {
            self.clear(&self.staging_prefix()).await?;
        }
        Ok(committed)
    }

    /// Drop staged output of a failed run. Published tables are not touched.
    pub async fn discard(&mut self) {
        self.pending.clear();
        if self.config.commit == CommitMode::Direct {
            return;
        }

        let prefix = self.staging_prefix();
        if let Err(e) = self.storage.delete_prefix(&prefix).await {
            warn!(prefix = %prefix, error = %e, "Failed to remove staged output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::credentials::Credentials;
    use tempfile::TempDir;

    async fn sink(dir: &TempDir, commit: CommitMode, write_mode: WriteMode) -> TableSink {
        let root = dir.path().to_str().unwrap();
        let session =
            EngineSession::create(&EngineConfig::default(), root, root, &Credentials::Ambient)
                .await
                .unwrap();
        let config = OutputConfig {
            write_mode,
            commit,
            ..Default::default()
        };
        TableSink::new(session, &config, "run-1")
    }

    async fn users(sink: &TableSink) -> DataFrame {
        sink.session
            .sql(
                "users",
                "SELECT * FROM (VALUES ('1', 'free'), ('2', 'paid')) AS t(user_id, level)",
            )
            .await
            .unwrap()
    }

    fn files_under(dir: &std::path::Path) -> Vec<String> {
        let mut found = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    found.extend(files_under(&path));
                } else {
                    found.push(path.to_string_lossy().to_string());
                }
            }
        }
        found
    }

    #[tokio::test]
    async fn test_staged_write_publishes_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let mut sink = sink(&dir, CommitMode::Staged, WriteMode::Overwrite).await;

        let df = users(&sink).await;
        let write = sink.write(&USERS_TABLE, df).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(write.rows, 2);
        assert!(write.committed);
        assert!(dir.path().join("users_table/_SUCCESS").exists());
        assert!(
            files_under(&dir.path().join("users_table"))
                .iter()
                .any(|f| f.ends_with(".parquet"))
        );
        assert!(!dir.path().join("_staging/run-1").exists());
    }

    #[tokio::test]
    async fn test_overwrite_removes_previous_files() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("users_table/stale.parquet");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"old").unwrap();

        let mut sink = sink(&dir, CommitMode::Direct, WriteMode::Overwrite).await;
        let df = users(&sink).await;
        sink.write(&USERS_TABLE, df).await.unwrap();

        assert!(!stale.exists());
        assert!(dir.path().join("users_table/_SUCCESS").exists());
    }

    #[tokio::test]
    async fn test_error_if_exists_refuses_existing_table() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("users_table/part-0.parquet");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"old").unwrap();

        let mut sink = sink(&dir, CommitMode::Staged, WriteMode::ErrorIfExists).await;
        let df = users(&sink).await;
        let err = sink.write(&USERS_TABLE, df).await.unwrap_err();

        assert!(matches!(err, SinkError::DestinationExists { .. }));
        assert!(existing.exists());
    }

    #[tokio::test]
    async fn test_deferred_publishes_on_finish() {
        let dir = TempDir::new().unwrap();
        let mut sink = sink(&dir, CommitMode::Deferred, WriteMode::Overwrite).await;

        let df = users(&sink).await;
        let write = sink.write(&USERS_TABLE, df).await.unwrap();
        assert!(!write.committed);
        assert!(!dir.path().join("users_table").exists());

        let committed = sink.finish().await.unwrap();
        assert_eq!(committed, vec!["users_table"]);
        assert!(dir.path().join("users_table/_SUCCESS").exists());
        assert!(!dir.path().join("_staging/run-1").exists());
    }

    #[tokio::test]
    async fn test_discard_leaves_published_tables() {
        let dir = TempDir::new().unwrap();
        let published = dir.path().join("users_table/part-0.parquet");
        std::fs::create_dir_all(published.parent().unwrap()).unwrap();
        std::fs::write(&published, b"old").unwrap();

        let mut sink = sink(&dir, CommitMode::Deferred, WriteMode::Overwrite).await;
        let df = users(&sink).await;
        sink.write(&USERS_TABLE, df).await.unwrap();
        sink.discard().await;

        assert!(published.exists());
        assert!(!dir.path().join("_staging/run-1").exists());
    }
}
