//! Vault control-plane access
//!
//! The agent talks to Vault through the [`ControlPlane`] trait: AppRole login,
//! the leadership check and the raft snapshot export. [`VaultClient`] is the HTTP
//! implementation; the trait is the seam tests substitute.

pub mod auth;
pub mod client;

pub use auth::{Credential, CredentialManager, TokenSource};
pub use client::VaultClient;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from a single control-plane request
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    /// Connection, TLS or body read failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Vault returned status {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Joined `errors` from the response body, or the raw body
        message: String,
    },

    /// A success response that could not be decoded
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built from the TLS settings
    #[error("cannot build Vault client: {0}")]
    Client(String),
}

/// Credential acquisition errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// The token file could not be read
    #[error("cannot read token file {path}: {source}")]
    TokenFile {
        /// Configured token file
        path: PathBuf,
        /// Underlying read failure
        #[source]
        source: std::io::Error,
    },

    /// The token file holds only whitespace
    #[error("token file {0} is empty")]
    EmptyTokenFile(PathBuf),

    /// AppRole login was rejected or failed in transit
    #[error("error logging into AppRole auth backend: {0}")]
    Login(#[source] ControlPlaneError),

    /// A token was requested before any was acquired
    #[error("no Vault token has been acquired")]
    MissingToken,
}

/// Snapshot export errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The snapshot request itself failed
    #[error("snapshot request failed: {0}")]
    Request(#[from] ControlPlaneError),

    /// A success status with zero bytes
    #[error("snapshot endpoint returned an empty body")]
    Empty,
}

/// Result of a role-based login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    /// The issued client token
    pub client_token: String,
    /// Lease duration in seconds as reported by Vault
    pub lease_duration: u64,
}

/// Operations the agent needs from the consensus store's control plane
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Exchange a role id and secret id for a short-lived token.
    async fn approle_login(
        &self,
        mount: &str,
        role_id: &str,
        secret_id: &str,
    ) -> Result<LoginResponse, ControlPlaneError>;

    /// Whether the node this client talks to is the current leader.
    async fn is_leader(&self, token: &str) -> Result<bool, ControlPlaneError>;

    /// Export a raft snapshot.
    async fn raft_snapshot(&self, token: &str) -> Result<Bytes, SnapshotError>;
}
