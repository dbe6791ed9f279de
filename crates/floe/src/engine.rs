//! Query engine session.
//!
//! Wraps a DataFusion `SessionContext` with the object stores for the input
//! and output roots registered, and exposes the handful of operations the
//! stages issue: load JSON, register a view, run SQL, write Parquet.

use datafusion::arrow::array::{AsArray, RecordBatch};
use datafusion::arrow::datatypes::{Schema, UInt64Type};
use datafusion::config::TableParquetOptions;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::{DataFrame, NdJsonReadOptions, SessionConfig, SessionContext};
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use floe_core::{BackendConfig, ParquetCompression, StorageProvider, StorageProviderRef};

use crate::config::EngineConfig;
use crate::credentials::Credentials;
use crate::error::{
    EngineError, ExecuteSnafu, QuerySnafu, ReadSnafu, SessionConfigSnafu, StorageSetupSnafu,
};

/// Handle onto the engine and the two storage roots.
///
/// Cheap to clone; every clone shares the same session state and views.
#[derive(Clone)]
pub struct EngineSession {
    ctx: SessionContext,
    input: StorageProviderRef,
    output: StorageProviderRef,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("session_id", &self.ctx.session_id())
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

impl EngineSession {
    /// Build the session and register the storage backends of both roots.
    pub async fn create(
        engine: &EngineConfig,
        input_root: &str,
        output_root: &str,
        credentials: &Credentials,
    ) -> Result<Self, EngineError> {
        let mut config =
            SessionConfig::from_string_hash_map(&engine.options).context(SessionConfigSnafu)?;
        if let Some(partitions) = engine.target_partitions {
            config = config.with_target_partitions(partitions);
        }
        let ctx = SessionContext::new_with_config(config);

        let input = Self::connect(&ctx, input_root, credentials).await?;
        let output = Self::connect(&ctx, output_root, credentials).await?;

        info!(
            input = input.canonical_url(),
            output = output.canonical_url(),
            "Created engine session"
        );

        Ok(Self { ctx, input, output })
    }

    async fn connect(
        ctx: &SessionContext,
        root: &str,
        credentials: &Credentials,
    ) -> Result<StorageProviderRef, EngineError> {
        let backend = BackendConfig::parse_url(root).context(StorageSetupSnafu { url: root })?;
        let storage =
            StorageProvider::for_url_with_options(root, credentials.storage_options(&backend))
                .await
                .context(StorageSetupSnafu { url: root })?;

        if let Some(url) = storage
            .engine_store_url()
            .context(StorageSetupSnafu { url: root })?
        {
            debug!(url = %url, "Registering object store");
            ctx.register_object_store(&url, storage.object_store());
        }

        Ok(Arc::new(storage))
    }

    /// Storage under the input root.
    pub fn input(&self) -> &StorageProviderRef {
        &self.input
    }

    /// Storage under the output root.
    pub fn output(&self) -> &StorageProviderRef {
        &self.output
    }

    /// Load newline-delimited JSON files given as engine URLs.
    ///
    /// With `schema` the records are decoded into exactly those columns;
    /// without it the engine infers one from the files.
    pub async fn read_json(
        &self,
        dataset: &str,
        files: Vec<String>,
        file_extension: &str,
        schema: Option<&Schema>,
    ) -> Result<DataFrame, EngineError> {
        let mut options = NdJsonReadOptions::default().file_extension(file_extension);
        if let Some(schema) = schema {
            options = options.schema(schema);
        }

        self.ctx
            .read_json(files, options)
            .await
            .context(ReadSnafu { dataset })
    }

    /// Register `df` as a view named `name`, replacing any previous one.
    pub fn register_view(&self, name: &str, df: DataFrame) -> Result<(), EngineError> {
        self.ctx
            .deregister_table(name)
            .context(QuerySnafu { name })?;
        self.ctx
            .register_table(name, df.into_view())
            .context(QuerySnafu { name })?;
        debug!(view = name, "Registered view");
        Ok(())
    }

    /// Plan a SQL query against the registered views.
    pub async fn sql(&self, name: &str, query: &str) -> Result<DataFrame, EngineError> {
        self.ctx.sql(query).await.context(QuerySnafu { name })
    }

    /// Execute `df` once and keep its result in memory.
    ///
    /// Later reads of the returned frame do not touch the inputs again.
    pub async fn cache(&self, name: &str, df: DataFrame) -> Result<DataFrame, EngineError> {
        df.cache().await.context(ExecuteSnafu { name })
    }

    /// Execute a query and collect its result.
    pub async fn collect(&self, name: &str, df: DataFrame) -> Result<Vec<RecordBatch>, EngineError> {
        df.collect().await.context(ExecuteSnafu { name })
    }

    /// Execute `df` and write it as hive-partitioned Parquet under `url`.
    ///
    /// `url` must name a directory (trailing slash). Returns the number of
    /// rows written.
    pub async fn write_parquet(
        &self,
        name: &str,
        df: DataFrame,
        url: &str,
        partition_by: &[&str],
        compression: ParquetCompression,
    ) -> Result<u64, EngineError> {
        let options = DataFrameWriteOptions::new()
            .with_partition_by(partition_by.iter().map(|c| c.to_string()).collect());

        let mut parquet = TableParquetOptions::default();
        parquet.global.compression = Some(compression.as_codec().to_string());

        let batches = df
            .write_parquet(url, options, Some(parquet))
            .await
            .context(ExecuteSnafu { name })?;

        Ok(batches
            .iter()
            .filter_map(|batch| batch.column_by_name("count"))
            .filter_map(|column| column.as_primitive_opt::<UInt64Type>())
            .flat_map(|counts| counts.iter().flatten())
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_engine_option_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_str().unwrap();
        let engine = EngineConfig {
            target_partitions: None,
            options: HashMap::from([(
                "datafusion.execution.no_such_option".to_string(),
                "1".to_string(),
            )]),
        };

        let err = EngineSession::create(&engine, root, root, &Credentials::Ambient)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionConfig { .. }));
    }

    #[tokio::test]
    async fn test_static_credentials_on_local_roots() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input");
        let output = temp_dir.path().join("output");
        let credentials = Credentials::Static {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI".to_string(),
        };

        let session = EngineSession::create(
            &EngineConfig::default(),
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            &credentials,
        )
        .await
        .unwrap();

        assert!(session.input().engine_store_url().unwrap().is_none());
        assert!(output.is_dir());
    }

    #[tokio::test]
    async fn test_views_replace_and_query() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_str().unwrap();
        let engine = EngineConfig {
            target_partitions: Some(2),
            options: HashMap::new(),
        };
        let session = EngineSession::create(&engine, root, root, &Credentials::Ambient)
            .await
            .unwrap();

        let first = session.sql("one", "SELECT 1 AS n").await.unwrap();
        session.register_view("numbers", first).unwrap();
        let second = session.sql("two", "SELECT 2 AS n").await.unwrap();
        session.register_view("numbers", second).unwrap();

        let df = session.sql("read", "SELECT n FROM numbers").await.unwrap();
        let batches = session.collect("read", df).await.unwrap();
        let values = batches[0]
            .column(0)
            .as_primitive::<datafusion::arrow::datatypes::Int64Type>();
        assert_eq!(values.value(0), 2);
    }

    #[tokio::test]
    async fn test_cached_frame_outlives_its_source_view() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_str().unwrap();
        let session =
            EngineSession::create(&EngineConfig::default(), root, root, &Credentials::Ambient)
                .await
                .unwrap();

        let source = session.sql("one", "SELECT 1 AS n").await.unwrap();
        session.register_view("source", source).unwrap();
        let df = session.sql("read", "SELECT n FROM source").await.unwrap();
        let cached = session.cache("read", df).await.unwrap();

        let replacement = session.sql("two", "SELECT 2 AS n").await.unwrap();
        session.register_view("source", replacement).unwrap();

        let batches = session.collect("read", cached).await.unwrap();
        let values = batches[0]
            .column(0)
            .as_primitive::<datafusion::arrow::datatypes::Int64Type>();
        assert_eq!(values.value(0), 1);
    }

    #[tokio::test]
    async fn test_write_parquet_reports_rows() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_str().unwrap();
        let session =
            EngineSession::create(&EngineConfig::default(), root, root, &Credentials::Ambient)
                .await
                .unwrap();

        let df = session
            .sql(
                "rows",
                "SELECT * FROM (VALUES (1, 'a'), (2, 'b'), (2, 'c')) AS t(k, v)",
            )
            .await
            .unwrap();
        let url = session.output().engine_url("out/");
        let rows = session
            .write_parquet("rows", df, &url, &["k"], ParquetCompression::Snappy)
            .await
            .unwrap();

        assert_eq!(rows, 3);
        assert!(temp_dir.path().join("out/k=1").is_dir());
        assert!(temp_dir.path().join("out/k=2").is_dir());
    }
}
