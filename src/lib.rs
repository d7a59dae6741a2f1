//! # Raft Snapshot Agent
//!
//! A daemon that periodically exports a Vault integrated-storage (raft) snapshot and
//! persists it to one or more storage backends, pruning old snapshots per backend.
//!
//! ## Overview
//!
//! Every cycle the agent renews its Vault credential if needed, checks whether the
//! local node is the raft leader, and only then captures a snapshot and fans it out
//! to every configured backend. Followers do nothing.
//!
//! ```rust,no_run
//! use raft_snapshot_agent::agent::SnapshotAgent;
//! use raft_snapshot_agent::config::Configuration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> raft_snapshot_agent::Result<()> {
//! let config = Configuration::load("/etc/vault.d/snapshot.json")?;
//! let mut agent = SnapshotAgent::from_config(&config).await?;
//! agent.run(config.frequency(), CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: JSON configuration, environment overrides and validation
//! - [`vault`]: control-plane client, leader gate, snapshot source and credentials
//! - [`storage`]: backend adapters, snapshot naming and the retention policy
//! - [`agent`]: the per-cycle state machine and the scheduling loop
//! - [`metrics`]: Prometheus counters for cycles and backend operations
//! - [`logging`]: tracing subscriber setup

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for the snapshot agent
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Credential acquisition or renewal failed
    #[error("Authentication error: {0}")]
    Auth(#[from] vault::AuthError),

    /// A control-plane call failed
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] vault::ControlPlaneError),

    /// Snapshot export failed
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] vault::SnapshotError),

    /// A storage backend could not be constructed
    #[error("Backend initialisation error: {0}")]
    BackendInit(#[from] storage::BackendInitError),

    /// Writing a snapshot to a backend failed
    #[error("Persist error: {0}")]
    Persist(#[from] storage::PersistError),

    /// Pruning old snapshots from a backend failed
    #[error("Prune error: {0}")]
    Prune(#[from] storage::PruneError),
}

/// Configuration loading and validation
pub mod config;

/// Tracing subscriber setup
pub mod logging;

/// Prometheus metrics
pub mod metrics;

/// Vault control-plane access
pub mod vault;

/// Storage backends and retention
pub mod storage;

/// Snapshot cycle and scheduling loop
pub mod agent;
