//! Azure Blob Storage backend implementation.

use object_store::ObjectStore;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AzureConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider, default_retry_config};

/// Azure Blob Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    pub key: Option<Path>,
}

impl StorageProvider {
    pub(super) fn construct_azure(
        config: AzureConfig,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = MicrosoftAzureBuilder::from_env()
            .with_account(&config.account)
            .with_container_name(&config.container)
            .with_retry(default_retry_config());

        for (key, value) in &options {
            builder = builder.with_config(key.parse().context(AzureConfigSnafu)?, value.clone());
        }

        let mut canonical_url = format!(
            "https://{}.blob.core.windows.net/{}",
            config.account, config.container
        );
        if let Some(key) = &config.key {
            canonical_url = format!("{canonical_url}/{key}");
        }

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(AzureConfigSnafu)?);

        Ok(Self {
            config: BackendConfig::Azure(config),
            object_store,
            canonical_url,
        })
    }
}
