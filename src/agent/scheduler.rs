//! Timer loop driving snapshot cycles until shutdown.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CycleState, SnapshotAgent};
use crate::metrics::AgentMetrics;

impl SnapshotAgent {
    /// Run a cycle immediately and then once per `interval` until `shutdown` fires.
    ///
    /// The wait starts after a cycle finishes, so cycles never overlap. A cycle in
    /// progress when shutdown is requested is allowed to finish.
    pub async fn run(&mut self, interval: Duration, shutdown: CancellationToken) -> u64 {
        let mut cycles = 0u64;
        info!(interval = ?interval, backends = self.backends.len(), "Starting snapshot loop");

        while !shutdown.is_cancelled() {
            self.run_cycle().await;
            cycles += 1;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    debug!(cycle = cycles, "Snapshot interval elapsed");
                }
            }
        }

        self.state = CycleState::Stopping;
        info!(cycles, "Shutting down");
        match AgentMetrics::export_metrics() {
            Ok(rendered) => debug!(metrics = %rendered, "Final metrics"),
            Err(e) => warn!(error = %e, "Cannot render final metrics"),
        }
        cycles
    }
}

/// Cancel `token` on SIGINT, or on SIGTERM on unix.
pub fn spawn_signal_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        token.cancel();
    })
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
