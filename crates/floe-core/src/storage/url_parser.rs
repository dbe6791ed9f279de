//! URL parsing for storage backends.
//!
//! Extracts backend configuration from the URL forms accepted for input and
//! output roots (S3, GCS, Azure, local filesystem), and renders the
//! canonical URLs under which the query engine addresses the same objects.

use object_store::path::Path;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{AzureConfig, GcsConfig, LocalConfig, S3Config};

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aAnN]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

const GCS_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-_\.]+)\.storage\.googleapis\.com(/(?P<key>.+))?$";
const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$";

const ABFS_URL: &str = r"^abfss?://(?P<container>[a-z0-9\-]+)@(?P<account>[a-z0-9]+)\.dfs\.core\.windows\.net(/(?P<key>.+))?$";
const AZURE_HTTPS: &str = r"^https://(?P<account>[a-z0-9]+)\.(blob|dfs)\.core\.windows\.net/(?P<container>[a-z0-9\-]+)(/(?P<key>.+))?$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Azure,
    Local,
}

/// Matchers in evaluation order. Cloud HTTPS forms are tried before the
/// generic scheme forms so virtual-hosted URLs are not misread.
static MATCHERS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    [
        (Backend::S3, S3_PATH),
        (Backend::S3, S3_VIRTUAL),
        (Backend::S3, S3_ENDPOINT_URL),
        (Backend::S3, S3_URL),
        (Backend::Gcs, GCS_PATH),
        (Backend::Gcs, GCS_VIRTUAL),
        (Backend::Gcs, GCS_URL),
        (Backend::Azure, ABFS_URL),
        (Backend::Azure, AZURE_HTTPS),
        (Backend::Local, FILE_URI),
        (Backend::Local, FILE_URL),
        (Backend::Local, FILE_PATH),
    ]
    .into_iter()
    .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("valid storage URL pattern")))
    .collect()
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    ///
    /// Trailing slashes are ignored, so `s3a://bucket/` and `s3a://bucket`
    /// describe the same root.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let trimmed = url.trim_end_matches('/');

        for (backend, regex) in MATCHERS.iter() {
            if let Some(matches) = regex.captures(trimmed) {
                return Ok(match backend {
                    Backend::S3 => Self::parse_s3(&matches),
                    Backend::Gcs => Self::parse_gcs(&matches),
                    Backend::Azure => Self::parse_azure(&matches),
                    Backend::Local => Self::parse_local(&matches),
                });
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let bucket = matches["bucket"].to_string();
        let region = matches.name("region").map(|m| m.as_str().to_string());

        let endpoint = matches.name("endpoint").map(|endpoint| {
            let port = matches
                .name("port")
                .and_then(|p| p.as_str().parse::<u16>().ok())
                .unwrap_or(443);
            let protocol = matches
                .name("protocol")
                .map(|p| p.as_str())
                .unwrap_or("https");
            format!("{protocol}://{}:{port}", endpoint.as_str())
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: key_of(matches),
        })
    }

    fn parse_gcs(matches: &regex::Captures) -> Self {
        BackendConfig::Gcs(GcsConfig {
            bucket: matches["bucket"].to_string(),
            key: key_of(matches),
        })
    }

    fn parse_azure(matches: &regex::Captures) -> Self {
        BackendConfig::Azure(AzureConfig {
            account: matches["account"].to_string(),
            container: matches["container"].to_string(),
            key: key_of(matches),
        })
    }

    fn parse_local(matches: &regex::Captures) -> Self {
        let path = &matches["path"];
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig { path })
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }

    /// Scheme and authority under which the engine resolves this backend's
    /// object store (`s3://bucket`, `gs://bucket`, `az://container`).
    ///
    /// Local roots are served by the engine's built-in filesystem store and
    /// return `None`.
    pub fn engine_store_url(&self) -> Option<String> {
        match self {
            BackendConfig::S3(s3) => Some(format!("s3://{}", s3.bucket)),
            BackendConfig::Gcs(gcs) => Some(format!("gs://{}", gcs.bucket)),
            BackendConfig::Azure(azure) => Some(format!("az://{}", azure.container)),
            BackendConfig::Local(_) => None,
        }
    }

    /// Full engine URL of `relative`, a path below the configured root.
    pub fn engine_url(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        let root = match self {
            BackendConfig::Local(local) => local.path.trim_end_matches('/').to_string(),
            _ => {
                let base = self
                    .engine_store_url()
                    .unwrap_or_default();
                match self.key() {
                    Some(key) => format!("{base}/{key}"),
                    None => base,
                }
            }
        };

        if relative.is_empty() {
            format!("{root}/")
        } else {
            format!("{root}/{relative}")
        }
    }
}

fn key_of(matches: &regex::Captures) -> Option<Path> {
    matches.name("key").map(|m| Path::from(m.as_str()))
}
