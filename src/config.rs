//! Agent configuration.
//!
//! The configuration is a single JSON document. Every block is optional; a storage
//! backend is enabled only when its identifying field (path, bucket or container) is
//! non-empty.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::storage::RetentionPolicy;

/// Path used when no configuration file is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vault.d/snapshot.json";

/// Vault address used when neither the file nor `VAULT_ADDR` provide one.
pub const DEFAULT_VAULT_ADDRESS: &str = "https://127.0.0.1:8200";

/// Interval between snapshot cycles when `frequency` is unset or unparsable.
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60 * 60);

/// Region used for S3 when none is configured.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Mount path of the AppRole auth method when none is configured.
pub const DEFAULT_APPROLE_PATH: &str = "approle";

const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
const ENV_AZURE_ACCOUNT: &str = "AZURE_STORAGE_ACCOUNT";
const ENV_AZURE_ACCESS_KEY: &str = "AZURE_STORAGE_ACCESS_KEY";

/// Errors raised while loading configuration. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        /// Path given on the command line
        path: PathBuf,
        /// Underlying read failure
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for this schema
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Parsed, but a value is unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Number of snapshots to keep per backend; `0` disables pruning
    pub retain: u64,

    /// Interval between cycles as a duration string such as `"1h"` or `"30m"`
    pub frequency: String,

    /// Log level name (`trace`, `debug`, `info`, `warn`, `error`)
    pub log_level: String,

    /// Vault connection and authentication
    #[serde(rename = "vault_config")]
    pub vault: VaultConfig,

    /// Local directory backend
    #[serde(rename = "local_storage")]
    pub local: LocalConfig,

    /// S3-compatible backend
    #[serde(rename = "aws_storage")]
    pub aws: S3Config,

    /// Google Cloud Storage backend
    #[serde(rename = "google_storage")]
    pub gcp: GcsConfig,

    /// Azure Blob Storage backend
    #[serde(rename = "azure_storage")]
    pub azure: AzureConfig,
}

/// Vault connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault base URL; `VAULT_ADDR` or the local default when empty
    pub address: String,
    /// PEM CA bundle used to verify Vault
    pub ca_cert: String,
    /// PEM client certificate for mutual TLS
    pub client_cert: String,
    /// PEM private key matching `client_cert`
    pub client_key: String,
    /// Skip certificate verification
    pub insecure: bool,
    /// AppRole role id
    pub role_id: String,
    /// AppRole secret id
    pub secret_id: String,
    /// Mount path of the AppRole auth method
    pub approle_path: String,
    /// File holding a static token, used when AppRole is not configured
    pub token_file: String,
}

impl VaultConfig {
    /// AppRole login is used whenever both role and secret ids are present.
    pub fn uses_approle(&self) -> bool {
        !self.role_id.is_empty() && !self.secret_id.is_empty()
    }

    /// The configured address, or the Vault default.
    pub fn address(&self) -> &str {
        if self.address.is_empty() {
            DEFAULT_VAULT_ADDRESS
        } else {
            &self.address
        }
    }

    /// The AppRole mount, or `approle`.
    pub fn approle_path(&self) -> &str {
        let trimmed = self.approle_path.trim_matches('/');
        if trimmed.is_empty() {
            DEFAULT_APPROLE_PATH
        } else {
            trimmed
        }
    }
}

/// Local directory backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory snapshots are written to
    pub path: String,
}

impl LocalConfig {
    /// Enabled when a path is set
    pub fn is_enabled(&self) -> bool {
        !self.path.is_empty()
    }
}

/// S3-compatible backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Static access key; the default credential chain when empty
    pub access_key_id: String,
    /// Static secret key
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible stores
    #[serde(rename = "s3_endpoint")]
    pub endpoint: String,
    /// Bucket region
    #[serde(rename = "s3_region")]
    pub region: String,
    /// Target bucket
    #[serde(rename = "s3_bucket")]
    pub bucket: String,
    /// Key prefix placed before `raft_snapshots/`
    #[serde(rename = "s3_key_prefix")]
    pub key_prefix: String,
    /// Request AES256 server-side encryption on upload
    #[serde(rename = "s3_server_side_encryption")]
    pub server_side_encryption: bool,
    /// When set, every cycle overwrites the same object and pruning is skipped
    #[serde(rename = "s3_static_snapshot_name")]
    pub static_snapshot_name: String,
    /// Address the bucket in the path instead of the host name
    #[serde(rename = "s3_force_path_style")]
    pub force_path_style: bool,
    /// Extra PEM CA bundle trusted in addition to the system roots
    pub ca_cert: String,
}

impl S3Config {
    /// Enabled when a bucket is set
    pub fn is_enabled(&self) -> bool {
        !self.bucket.is_empty()
    }

    /// The configured region, or `us-east-1`.
    pub fn region(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_S3_REGION
        } else {
            &self.region
        }
    }

    /// Static credentials are only used when both halves are present.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            None
        } else {
            Some((&self.access_key_id, &self.secret_access_key))
        }
    }
}

/// Google Cloud Storage backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    /// Target bucket
    pub bucket: String,
    /// Service account key file; application default credentials when empty
    pub service_account_path: String,
}

impl GcsConfig {
    /// Enabled when a bucket is set
    pub fn is_enabled(&self) -> bool {
        !self.bucket.is_empty()
    }
}

/// Azure Blob Storage backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Storage account; `AZURE_STORAGE_ACCOUNT` overrides it
    pub account_name: String,
    /// Shared key; `AZURE_STORAGE_ACCESS_KEY` overrides it
    pub account_key: String,
    /// Target container
    pub container_name: String,
}

impl AzureConfig {
    /// Enabled when a container is set
    pub fn is_enabled(&self) -> bool {
        !self.container_name.is_empty()
    }
}

impl Configuration {
    /// Read, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json_str(&raw)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document without touching the environment.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply environment overrides. Azure credentials from the environment win over
    /// the file; `VAULT_ADDR` only fills an empty address.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(account) = non_empty(ENV_AZURE_ACCOUNT) {
            self.azure.account_name = account;
        }
        if let Some(key) = non_empty(ENV_AZURE_ACCESS_KEY) {
            self.azure.account_key = key;
        }
        if self.vault.address.is_empty() {
            if let Some(address) = non_empty(ENV_VAULT_ADDR) {
                self.vault.address = address;
            }
        }
    }

    /// Reject configurations the agent cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.vault.uses_approle() && self.vault.token_file.is_empty() {
            return Err(ConfigError::Invalid(
                "vault_config needs either role_id and secret_id or token_file".to_string(),
            ));
        }

        if self.azure.is_enabled()
            && (self.azure.account_name.is_empty() || self.azure.account_key.is_empty())
        {
            return Err(ConfigError::Invalid(
                "azure_storage requires account_name and account_key".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether at least one storage backend is configured
    pub fn has_backend(&self) -> bool {
        self.local.is_enabled() || self.aws.is_enabled() || self.gcp.is_enabled() || self.azure.is_enabled()
    }

    /// Cycle interval. Falls back to one hour when unset or unparsable.
    pub fn frequency(&self) -> Duration {
        if self.frequency.trim().is_empty() {
            return DEFAULT_FREQUENCY;
        }
        match humantime::parse_duration(self.frequency.trim()) {
            Ok(interval) if !interval.is_zero() => interval,
            Ok(_) | Err(_) => {
                warn!(
                    frequency = %self.frequency,
                    "Unparsable snapshot frequency, defaulting to 1h"
                );
                DEFAULT_FREQUENCY
            }
        }
    }

    /// Retention derived from `retain`
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retain)
    }
}
