//! One snapshot cycle: auth, leadership, capture, fan-out.

use chrono::Utc;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, trace, warn};

use super::SnapshotAgent;
use crate::metrics::AgentMetrics;
use crate::storage::{
    BackendKind, CapturedSnapshot, PersistError, PruneError, PruneReport, RetentionPolicy,
    SnapshotBackend,
};
use crate::AgentError;

/// Where the agent is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Waiting for the next tick
    Idle,
    /// Making sure the Vault token is usable
    CheckingAuth,
    /// Asking the node whether it leads the cluster
    CheckingLeadership,
    /// Not the leader; the cycle ends without a snapshot
    Skipped,
    /// Exporting the snapshot
    Capturing,
    /// Persisting and pruning on every backend
    Distributing,
    /// Shutdown requested
    Stopping,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::CheckingAuth => "checking_auth",
            CycleState::CheckingLeadership => "checking_leadership",
            CycleState::Skipped => "skipped",
            CycleState::Capturing => "capturing",
            CycleState::Distributing => "distributing",
            CycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Result of one backend's persist-then-prune
#[derive(Debug)]
pub struct BackendOutcome {
    /// Which backend this is
    pub backend: BackendKind,
    /// Destination as shown in logs
    pub destination: String,
    /// Locator of the new object, or why it could not be written
    pub persisted: Result<String, PersistError>,
    /// `None` when pruning did not run (persist failed or retention disabled)
    pub pruned: Option<Result<PruneReport, PruneError>>,
}

impl BackendOutcome {
    /// Whether the snapshot was written; prune results do not count
    pub fn is_success(&self) -> bool {
        self.persisted.is_ok()
    }

    fn log(&self) {
        match &self.persisted {
            Ok(locator) => info!(
                backend = %self.backend,
                destination = %self.destination,
                locator = %locator,
                "Successfully created snapshot"
            ),
            Err(e) => error!(
                backend = %self.backend,
                destination = %self.destination,
                error = %e,
                "Failed to create snapshot"
            ),
        }

        match &self.pruned {
            Some(Ok(report)) if !report.deleted.is_empty() => info!(
                backend = %self.backend,
                deleted = report.deleted.len(),
                kept = report.snapshots_found - report.deleted.len(),
                "Pruned old snapshots"
            ),
            Some(Err(e)) => warn!(
                backend = %self.backend,
                destination = %self.destination,
                error = %e,
                "Failed to prune old snapshots"
            ),
            _ => {}
        }
    }
}

/// How a cycle ended
#[derive(Debug)]
pub enum CycleOutcome {
    /// This node is not the leader; nothing was captured
    NotLeader,
    /// Auth, leadership or capture failed; no backend was called
    Aborted(AgentError),
    /// A snapshot was captured and handed to every backend
    Completed(Vec<BackendOutcome>),
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::NotLeader => "skipped",
            CycleOutcome::Aborted(_) => "aborted",
            CycleOutcome::Completed(_) => "completed",
        }
    }

    fn log(&self) {
        match self {
            CycleOutcome::NotLeader => info!("Not running on leader node, skipping"),
            CycleOutcome::Aborted(e) => error!(error = %e, "Snapshot cycle aborted"),
            CycleOutcome::Completed(outcomes) => outcomes.iter().for_each(BackendOutcome::log),
        }
    }
}

impl SnapshotAgent {
    fn transition(&mut self, next: CycleState) {
        trace!(from = %self.state, to = %next, "Cycle state");
        self.state = next;
    }

    /// Run one cycle to completion, log its outcome and return to `Idle`.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = self.execute_cycle().await;

        outcome.log();
        AgentMetrics::record_cycle(outcome.label());
        self.transition(CycleState::Idle);

        outcome
    }

    async fn execute_cycle(&mut self) -> CycleOutcome {
        self.transition(CycleState::CheckingAuth);
        let token = match self.credentials.ensure_valid_token(self.control_plane.as_ref()).await {
            Ok(token) => token.to_string(),
            Err(e) => return CycleOutcome::Aborted(e.into()),
        };

        self.transition(CycleState::CheckingLeadership);
        match self.control_plane.is_leader(&token).await {
            Ok(true) => {}
            Ok(false) => {
                self.transition(CycleState::Skipped);
                return CycleOutcome::NotLeader;
            }
            Err(e) => return CycleOutcome::Aborted(e.into()),
        }

        self.transition(CycleState::Capturing);
        let data = match self.control_plane.raft_snapshot(&token).await {
            Ok(data) => data,
            Err(e) => return CycleOutcome::Aborted(e.into()),
        };
        let snapshot = CapturedSnapshot::new(data, Utc::now());
        AgentMetrics::record_snapshot_bytes(snapshot.len());
        info!(
            bytes = snapshot.len(),
            sha256 = %snapshot.sha256_hex(),
            name = %snapshot.object_name(),
            "Captured raft snapshot"
        );

        self.transition(CycleState::Distributing);
        CycleOutcome::Completed(distribute(&self.backends, &snapshot, self.policy).await)
    }
}

/// Fan a snapshot out to every backend concurrently. Each backend persists and
/// then prunes in sequence; outcomes come back in backend order.
pub async fn distribute(
    backends: &[Arc<dyn SnapshotBackend>],
    snapshot: &CapturedSnapshot,
    policy: RetentionPolicy,
) -> Vec<BackendOutcome> {
    join_all(
        backends
            .iter()
            .map(|backend| persist_then_prune(backend.as_ref(), snapshot, policy)),
    )
    .await
}

async fn persist_then_prune(
    backend: &dyn SnapshotBackend,
    snapshot: &CapturedSnapshot,
    policy: RetentionPolicy,
) -> BackendOutcome {
    let kind = backend.kind();
    let persisted = backend.persist(snapshot).await;
    AgentMetrics::record_persist(kind.as_str(), persisted.is_ok());

    let pruned = if persisted.is_ok() && !policy.is_disabled() {
        let result = backend.prune(&policy).await;
        let deleted = result.as_ref().map(|report| report.deleted.len()).unwrap_or(0);
        AgentMetrics::record_prune(kind.as_str(), result.is_ok(), deleted);
        Some(result)
    } else {
        None
    };

    BackendOutcome {
        backend: kind,
        destination: backend.destination(),
        persisted,
        pruned,
    }
}
