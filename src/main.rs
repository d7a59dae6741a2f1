use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use raft_snapshot_agent::agent::{spawn_signal_listener, SnapshotAgent};
use raft_snapshot_agent::config::{Configuration, DEFAULT_CONFIG_PATH};
use raft_snapshot_agent::logging;

/// Periodically snapshot a Vault raft cluster from its leader node
#[derive(Debug, Parser)]
#[command(name = "raft-snapshot-agent", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Configuration::load(&cli.config)
        .with_context(|| format!("cannot load configuration from {}", cli.config.display()))?;
    logging::init(&config.log_level);

    if !config.has_backend() {
        warn!("No storage backend configured, snapshots will be captured but not stored");
    }

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let mut agent = SnapshotAgent::from_config(&config)
        .await
        .context("cannot start snapshot agent")?;
    info!(
        backends = agent.backends().len(),
        retain = config.retain,
        "Snapshot agent ready"
    );

    agent.run(config.frequency(), shutdown).await;
    Ok(())
}
