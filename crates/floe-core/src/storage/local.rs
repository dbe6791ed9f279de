//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{IoSnafu, ObjectStoreSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

impl LocalConfig {
    /// Filesystem directory backing `prefix` under this root.
    pub fn dir(&self, prefix: &str) -> PathBuf {
        PathBuf::from(&self.path).join(prefix.trim_matches('/'))
    }
}

impl StorageProvider {
    pub(super) async fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&config.path)
            .await
            .context(IoSnafu)?;

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(LocalFileSystem::new_with_prefix(&config.path).context(ObjectStoreSnafu)?);

        let canonical_url = format!("file://{}", config.path);

        Ok(Self {
            config: BackendConfig::Local(config),
            object_store,
            canonical_url,
        })
    }

    /// Remove the directory tree left behind under `prefix`.
    ///
    /// Object stores have no directories, but the local filesystem keeps the
    /// empty ones after their files are deleted or renamed away. Stale
    /// partition directories would otherwise survive an overwrite.
    pub(super) async fn prune_local_dir(&self, prefix: &str) -> Result<(), StorageError> {
        let BackendConfig::Local(local) = &self.config else {
            return Ok(());
        };
        if prefix.trim_matches('/').is_empty() {
            return Ok(());
        }

        match tokio::fs::remove_dir_all(local.dir(prefix)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { source }),
        }
    }
}
