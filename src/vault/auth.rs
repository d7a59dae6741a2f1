//! Vault credential lifecycle
//!
//! The [`CredentialManager`] is the single owner of the Vault token. It either reads
//! a static token from a file once, or logs in through AppRole and renews the token
//! once half of its lease has elapsed.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{AuthError, ControlPlane};
use crate::config::VaultConfig;
use crate::metrics::AgentMetrics;

/// Validity assumed for a token read from a file, which carries no server expiry.
pub fn static_token_validity() -> Duration {
    Duration::hours(1)
}

/// Longest lease honoured when computing a renewal point, about a century.
pub const MAX_LEASE_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Where the Vault token comes from
#[derive(Clone)]
pub enum TokenSource {
    /// A token stored in a file, read once per run
    File(PathBuf),

    /// AppRole login, renewed at half the lease
    AppRole {
        /// Auth mount path, `approle` unless configured
        mount: String,
        /// Role identifier
        role_id: String,
        /// Secret identifier
        secret_id: String,
    },
}

impl TokenSource {
    /// AppRole when both ids are present, otherwise the token file.
    pub fn from_config(config: &VaultConfig) -> Self {
        if config.uses_approle() {
            TokenSource::AppRole {
                mount: config.approle_path().to_string(),
                role_id: config.role_id.clone(),
                secret_id: config.secret_id.clone(),
            }
        } else {
            TokenSource::File(PathBuf::from(&config.token_file))
        }
    }

    /// Only AppRole tokens are renewed within a run.
    pub fn is_renewable(&self) -> bool {
        matches!(self, TokenSource::AppRole { .. })
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::File(path) => f.debug_tuple("File").field(path).finish(),
            TokenSource::AppRole { mount, role_id, .. } => f
                .debug_struct("AppRole")
                .field("mount", mount)
                .field("role_id", role_id)
                .field("secret_id", &"<redacted>")
                .finish(),
        }
    }
}

/// A Vault token and the instant after which it must be renewed
#[derive(Clone)]
pub struct Credential {
    token: String,
    expiry: DateTime<Utc>,
}

impl Credential {
    /// Create a credential with an explicit expiry
    pub fn new(token: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expiry,
        }
    }

    /// Credential for a leased token issued at `issued_at`. The expiry is placed at
    /// half the lease so renewal happens well before Vault revokes the token.
    ///
    /// Leases beyond [`MAX_LEASE_SECONDS`] are capped, and an expiry past the end of
    /// the calendar is clamped to the latest representable instant.
    pub fn from_lease(token: impl Into<String>, issued_at: DateTime<Utc>, lease_seconds: u64) -> Self {
        let capped = lease_seconds.min(MAX_LEASE_SECONDS) as i64;
        let half_lease = Duration::milliseconds(capped * 500);
        let expiry = issued_at
            .checked_add_signed(half_lease)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(token, expiry)
    }

    /// Token sent as `X-Vault-Token`
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Instant at which the token must be renewed
    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Whether `now` is at or past the expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Owner of the agent's Vault credential
#[derive(Debug)]
pub struct CredentialManager {
    source: TokenSource,
    credential: Option<Credential>,
}

impl CredentialManager {
    /// Create a manager that has not acquired a token yet
    pub fn new(source: TokenSource) -> Self {
        Self {
            source,
            credential: None,
        }
    }

    /// Create a manager and acquire the first token. Used at startup, where a
    /// failure is fatal.
    pub async fn login(source: TokenSource, control_plane: &dyn ControlPlane) -> Result<Self, AuthError> {
        let mut manager = Self::new(source);
        manager.acquire(control_plane).await?;
        Ok(manager)
    }

    /// Configured token source
    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    /// Current credential, if one has been acquired
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Whether a check at `now` must (re)acquire the token. Static tokens are only
    /// ever acquired once.
    pub fn needs_renewal_at(&self, now: DateTime<Utc>) -> bool {
        match &self.credential {
            None => true,
            Some(credential) => self.source.is_renewable() && credential.is_expired_at(now),
        }
    }

    /// Return a token that is valid for the coming control-plane calls, renewing it
    /// first when it has reached its expiry.
    pub async fn ensure_valid_token(&mut self, control_plane: &dyn ControlPlane) -> Result<&str, AuthError> {
        if self.needs_renewal_at(Utc::now()) {
            if self.credential.is_some() {
                info!("Vault token reached its renewal point, logging in again");
            }
            self.acquire(control_plane).await?;
        }

        self.credential
            .as_ref()
            .map(Credential::token)
            .ok_or(AuthError::MissingToken)
    }

    /// Acquire a fresh token from the configured source.
    pub async fn acquire(&mut self, control_plane: &dyn ControlPlane) -> Result<(), AuthError> {
        let result = match &self.source {
            TokenSource::File(path) => read_token_file(path)
                .await
                .map(|token| Credential::new(token, Utc::now() + static_token_validity())),
            TokenSource::AppRole {
                mount,
                role_id,
                secret_id,
            } => match control_plane.approle_login(mount, role_id, secret_id).await {
                Ok(login) => Ok(Credential::from_lease(
                    login.client_token,
                    Utc::now(),
                    login.lease_duration,
                )),
                Err(e) => Err(AuthError::Login(e)),
            },
        };

        AgentMetrics::record_token_renewal(result.is_ok());

        match result {
            Ok(credential) => {
                debug!(expiry = %credential.expiry(), "Vault token acquired");
                self.credential = Some(credential);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to acquire Vault token");
                Err(e)
            }
        }
    }
}

async fn read_token_file(path: &Path) -> Result<String, AuthError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AuthError::TokenFile {
            path: path.to_path_buf(),
            source,
        })?;

    let token = raw.trim();
    if token.is_empty() {
        return Err(AuthError::EmptyTokenFile(path.to_path_buf()));
    }
    Ok(token.to_string())
}
