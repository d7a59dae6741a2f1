//! The snapshot agent: one context object owning everything a cycle needs.
//!
//! [`SnapshotAgent`] is built once at startup from the configuration and then driven
//! by [`SnapshotAgent::run`] (the timer loop) or [`SnapshotAgent::run_cycle`] (a
//! single cycle).

pub mod cycle;
pub mod scheduler;

pub use cycle::{BackendOutcome, CycleOutcome, CycleState};
pub use scheduler::spawn_signal_listener;

use std::sync::Arc;
use tracing::info;

use crate::config::Configuration;
use crate::storage::{self, RetentionPolicy, SnapshotBackend};
use crate::vault::{ControlPlane, CredentialManager, TokenSource, VaultClient};

/// Context for the snapshot loop
pub struct SnapshotAgent {
    credentials: CredentialManager,
    control_plane: Arc<dyn ControlPlane>,
    backends: Vec<Arc<dyn SnapshotBackend>>,
    policy: RetentionPolicy,
    state: CycleState,
}

impl SnapshotAgent {
    /// Assemble an agent from already constructed parts
    pub fn new(
        credentials: CredentialManager,
        control_plane: Arc<dyn ControlPlane>,
        backends: Vec<Arc<dyn SnapshotBackend>>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            credentials,
            control_plane,
            backends,
            policy,
            state: CycleState::Idle,
        }
    }

    /// Build the Vault client, acquire the first token and construct every enabled
    /// backend. Any failure here is fatal to the process.
    pub async fn from_config(config: &Configuration) -> crate::Result<Self> {
        let client = VaultClient::new(&config.vault)?;
        info!(address = %client.address(), "Configured Vault client");

        let credentials = CredentialManager::login(TokenSource::from_config(&config.vault), &client).await?;
        let backends = storage::build_backends(config).await?;

        Ok(Self::new(
            credentials,
            Arc::new(client),
            backends,
            config.retention_policy(),
        ))
    }

    /// Configured backends in construction order
    pub fn backends(&self) -> &[Arc<dyn SnapshotBackend>] {
        &self.backends
    }

    /// Retention applied after each persist
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Current cycle phase
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Token state, for inspection
    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }
}
