//! Multi-cloud storage abstraction.
//!
//! Provides a unified interface over S3, GCS, Azure Blob Storage and the
//! local filesystem. The query engine reads and writes table data through
//! the same `ObjectStore` handles; this module covers everything the job does
//! around the engine: listing input files, clearing destinations, promoting
//! staged output and writing markers.

mod azure;
mod gcs;
mod local;
mod s3;
mod url_parser;

pub use azure::AzureConfig;
pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload, RetryConfig};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use url::Url;

use crate::emit;
use crate::error::{EngineUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

/// Maximum number of concurrent renames while promoting a prefix.
const PROMOTE_CONCURRENCY: usize = 16;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

fn default_retry_config() -> RetryConfig {
    RetryConfig::default()
}

/// Storage provider that abstracts over different cloud storage backends.
///
/// All paths taken and returned by its methods are relative to the root URL
/// the provider was created for.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given root URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Gcs(config) => Self::construct_gcs(config, options),
            BackendConfig::Azure(config) => Self::construct_azure(config, options),
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Human-readable URL of the root, used in logs.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// The underlying object store, unprefixed (keys are bucket-absolute).
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }

    /// URL under which this store must be registered with the query engine,
    /// or `None` when the engine serves the backend natively.
    pub fn engine_store_url(&self) -> Result<Option<Url>, StorageError> {
        self.config
            .engine_store_url()
            .map(|url| Url::parse(&url).context(EngineUrlSnafu { url }))
            .transpose()
    }

    /// Engine-addressable URL of a path below the root.
    pub fn engine_url(&self, relative: &str) -> String {
        self.config.engine_url(relative)
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    fn key_part_count(&self) -> usize {
        self.config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default()
    }

    /// List every object under `prefix`, recursively.
    ///
    /// Returns paths relative to the root, sorted. A prefix that does not
    /// exist yields an empty list.
    pub async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<Path>, StorageError> {
        let prefix = Path::from(prefix);
        let full_prefix = self.qualify_path(&prefix);
        let key_part_count = self.key_part_count();
        let start = Instant::now();

        let result: Result<Vec<Path>, object_store::Error> = self
            .object_store
            .list(Some(&full_prefix))
            .filter_map(|meta| async move {
                match meta {
                    Ok(meta) => Some(Ok(meta.location)),
                    Err(object_store::Error::NotFound { .. }) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .try_collect()
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::of(&result),
            duration: start.elapsed(),
        });

        let mut paths: Vec<Path> = result
            .context(ObjectStoreSnafu)?
            .into_iter()
            .map(|location| location.parts().skip(key_part_count).collect())
            .collect();
        paths.sort();

        debug!(prefix = %prefix, count = paths.len(), "Listed objects");
        Ok(paths)
    }

    /// Whether at least one object exists under `prefix`.
    pub async fn has_objects(&self, prefix: &str) -> Result<bool, StorageError> {
        let prefix = Path::from(prefix);
        let full_prefix = self.qualify_path(&prefix);
        let mut stream = self.object_store.list(Some(&full_prefix));

        match stream.next().await {
            None | Some(Err(object_store::Error::NotFound { .. })) => Ok(false),
            Some(Ok(_)) => Ok(true),
            Some(Err(source)) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::of(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete every object under `prefix`.
    ///
    /// Uses the backend's bulk delete where available. Returns the number of
    /// objects removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let paths = self.list_with_prefix(prefix).await?;
        let count = paths.len();

        if count > 0 {
            let qualified: Vec<Result<Path, object_store::Error>> = paths
                .iter()
                .map(|path| Ok(self.qualify_path(path).into_owned()))
                .collect();

            let start = Instant::now();
            let result: Result<Vec<Path>, object_store::Error> = self
                .object_store
                .delete_stream(futures::stream::iter(qualified).boxed())
                .try_collect()
                .await;

            emit!(StorageRequest {
                operation: StorageOperation::Delete,
                status: RequestStatus::of(&result),
                duration: start.elapsed(),
            });
            result.context(ObjectStoreSnafu)?;
        }

        self.prune_local_dir(prefix).await?;
        debug!(prefix, count, "Deleted prefix");
        Ok(count)
    }

    /// Server-side rename (move) operation.
    ///
    /// Zero-copy on the cloud backends (copy + delete for S3, rewrite for
    /// GCS, copy for Azure) and `std::fs::rename` locally.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let from_qualified = self.qualify_path(from);
        let to_qualified = self.qualify_path(to);
        let start = Instant::now();
        let result = self
            .object_store
            .rename(&from_qualified, &to_qualified)
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Rename,
            status: RequestStatus::of(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Move every object under `from` to the same relative location under `to`.
    ///
    /// Objects already present under `to` are not removed first; callers
    /// clear the destination when they need replace semantics. Returns the
    /// number of objects moved.
    pub async fn promote_prefix(&self, from: &str, to: &str) -> Result<usize, StorageError> {
        let from_parts = Path::from(from).parts().count();
        let to_prefix = Path::from(to);
        let sources = self.list_with_prefix(from).await?;
        let count = sources.len();

        futures::stream::iter(sources)
            .map(|source| {
                let target: Path = to_prefix
                    .parts()
                    .chain(source.parts().skip(from_parts))
                    .collect();
                async move { self.rename(&source, &target).await }
            })
            .buffer_unordered(PROMOTE_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        self.prune_local_dir(from).await?;
        debug!(from, to, count, "Promoted prefix");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn local_provider(dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    fn write(dir: &TempDir, relative: &str, contents: &[u8]) {
        let path = dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_list_returns_sorted_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir, "catalog_data/A/A/B/TRAABJL12903CDCF1A.json", b"{}");
        write(&temp_dir, "catalog_data/A/A/A/TRAAAAW128F429D538.json", b"{}");
        write(&temp_dir, "event_data/2018/11/2018-11-01-events.json", b"{}");

        let storage = local_provider(&temp_dir).await;
        let paths = storage.list_with_prefix("catalog_data").await.unwrap();
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();

        assert_eq!(
            paths,
            vec![
                "catalog_data/A/A/A/TRAAAAW128F429D538.json",
                "catalog_data/A/A/B/TRAABJL12903CDCF1A.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        assert!(storage.list_with_prefix("nothing_here").await.unwrap().is_empty());
        assert!(!storage.has_objects("nothing_here").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_prefix_is_segment_scoped() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir, "items_table/year=2000/part-0.parquet", b"old");
        write(&temp_dir, "items_table/_SUCCESS", b"");
        write(&temp_dir, "items_table_backup/part-0.parquet", b"keep");

        let storage = local_provider(&temp_dir).await;
        let deleted = storage.delete_prefix("items_table").await.unwrap();

        assert_eq!(deleted, 2);
        assert!(!temp_dir.path().join("items_table").exists());
        assert!(temp_dir.path().join("items_table_backup/part-0.parquet").exists());
    }

    #[tokio::test]
    async fn test_promote_prefix_moves_tree() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir, "_staging/run-1/time_table/year=2018/month=11/a.parquet", b"a");
        write(&temp_dir, "_staging/run-1/time_table/year=2018/month=12/b.parquet", b"b");

        let storage = local_provider(&temp_dir).await;
        let moved = storage
            .promote_prefix("_staging/run-1/time_table", "time_table")
            .await
            .unwrap();

        assert_eq!(moved, 2);
        assert_eq!(
            std::fs::read(temp_dir.path().join("time_table/year=2018/month=11/a.parquet")).unwrap(),
            b"a"
        );
        assert!(temp_dir.path().join("time_table/year=2018/month=12/b.parquet").exists());
        assert!(!temp_dir.path().join("_staging/run-1/time_table").exists());
    }

    #[tokio::test]
    async fn test_put_marker() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;

        let path = Path::from("users_table/_SUCCESS");
        storage
            .put_payload(&path, PutPayload::from_static(b""))
            .await
            .unwrap();

        assert!(storage.has_objects("users_table").await.unwrap());
        let marker = temp_dir.path().join("users_table/_SUCCESS");
        assert_eq!(std::fs::metadata(marker).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_local_engine_urls() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_provider(&temp_dir).await;
        let root = temp_dir.path().to_str().unwrap();

        assert!(storage.engine_store_url().unwrap().is_none());
        assert_eq!(
            storage.engine_url("users_table/"),
            format!("{root}/users_table/")
        );
    }

    #[tokio::test]
    async fn test_s3_provider_registers_bucket_url() {
        let options = HashMap::from([
            ("aws_access_key_id".to_string(), "AKIDEXAMPLE".to_string()),
            ("aws_secret_access_key".to_string(), "secret".to_string()),
            ("aws_region".to_string(), "us-west-2".to_string()),
        ]);
        let storage = StorageProvider::for_url_with_options("s3a://udacity-dend/", options)
            .await
            .unwrap();

        let url = storage.engine_store_url().unwrap().unwrap();
        assert_eq!(url.as_str(), "s3://udacity-dend");
        assert_eq!(
            storage.engine_url("event_data/2018/11/2018-11-01-events.json"),
            "s3://udacity-dend/event_data/2018/11/2018-11-01-events.json"
        );
    }
}
