//! Storage credentials.
//!
//! Credentials are loaded once at startup and handed to the storage builders
//! as explicit options. Nothing is written to the process environment.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use tracing::info;

use floe_core::BackendConfig;

use crate::error::{
    CredentialsError, MissingKeySnafu, MissingSectionSnafu, ReadCredentialFileSnafu,
};

const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Where the job's storage credentials come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum CredentialSource {
    /// A section of an INI-style key-value file.
    File {
        #[serde(default = "default_credential_path")]
        path: String,
        #[serde(default = "default_credential_section")]
        section: String,
    },
    /// Values given inline, usually through `${VAR}` interpolation.
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
    /// Let the storage builders use their ambient provider chain.
    Environment,
}

fn default_credential_path() -> String {
    "dl.cfg".to_string()
}

fn default_credential_section() -> String {
    "AWS".to_string()
}

impl Default for CredentialSource {
    fn default() -> Self {
        CredentialSource::File {
            path: default_credential_path(),
            section: default_credential_section(),
        }
    }
}

impl CredentialSource {
    /// Resolve the source into credentials.
    pub fn load(&self) -> Result<Credentials, CredentialsError> {
        match self {
            CredentialSource::File { path, section } => {
                info!(path = %path, section = %section, "Reading credentials");
                read_credential_file(path, section)
            }
            CredentialSource::Static {
                access_key_id,
                secret_access_key,
            } => Ok(Credentials::Static {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            }),
            CredentialSource::Environment => Ok(Credentials::Ambient),
        }
    }
}

/// Loaded storage credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Defer to the backend's own provider chain.
    Ambient,
    /// An access key pair.
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Ambient => write!(f, "Ambient"),
            Credentials::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish(),
        }
    }
}

impl Credentials {
    /// Storage options for a root on `backend`.
    ///
    /// The key pair only applies to S3; other backends get no options and
    /// fall back to their own provider chain.
    pub fn storage_options(&self, backend: &BackendConfig) -> HashMap<String, String> {
        match (self, backend) {
            (
                Credentials::Static {
                    access_key_id,
                    secret_access_key,
                },
                BackendConfig::S3(_),
            ) => HashMap::from([
                ("aws_access_key_id".to_string(), access_key_id.clone()),
                ("aws_secret_access_key".to_string(), secret_access_key.clone()),
            ]),
            _ => HashMap::new(),
        }
    }
}

fn read_credential_file(path: &str, section: &str) -> Result<Credentials, CredentialsError> {
    let sections: HashMap<String, HashMap<String, String>> = config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Ini))
        .build()
        .and_then(|parsed| parsed.try_deserialize())
        .context(ReadCredentialFileSnafu { path })?;

    // Section and key names are matched case-insensitively.
    let (_, entries) = sections
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(section))
        .context(MissingSectionSnafu { path, section })?;

    let lookup = |key: &str| {
        entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.clone())
            .context(MissingKeySnafu { path, section, key })
    };

    Ok(Credentials::Static {
        access_key_id: lookup(ACCESS_KEY_ID)?,
        secret_access_key: lookup(SECRET_ACCESS_KEY)?,
    })
}
