//! Snapshot agent metrics collection
//!
//! Provides Prometheus-compatible counters for snapshot cycles, backend persists
//! and prunes, and Vault token renewals.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Counter for completed cycles by outcome
    pub static ref SNAPSHOT_CYCLES: IntCounterVec = register_int_counter_vec!(
        "raft_snapshot_cycles_total",
        "Total number of snapshot cycles",
        &["outcome"]
    ).unwrap();

    /// Counter for bytes captured from the snapshot endpoint
    pub static ref SNAPSHOT_BYTES: IntCounter = register_int_counter!(
        "raft_snapshot_bytes_total",
        "Total number of snapshot bytes captured"
    ).unwrap();

    /// Counter for persist attempts per backend
    pub static ref BACKEND_PERSISTS: IntCounterVec = register_int_counter_vec!(
        "raft_snapshot_backend_persists_total",
        "Total number of snapshot persist attempts",
        &["backend", "status"]
    ).unwrap();

    /// Counter for prune passes per backend
    pub static ref BACKEND_PRUNES: IntCounterVec = register_int_counter_vec!(
        "raft_snapshot_backend_prunes_total",
        "Total number of retention prune passes",
        &["backend", "status"]
    ).unwrap();

    /// Counter for snapshot objects deleted by retention
    pub static ref OBJECTS_PRUNED: IntCounterVec = register_int_counter_vec!(
        "raft_snapshot_objects_pruned_total",
        "Total number of snapshot objects deleted by retention",
        &["backend"]
    ).unwrap();

    /// Counter for Vault token acquisitions and renewals
    pub static ref TOKEN_RENEWALS: IntCounterVec = register_int_counter_vec!(
        "raft_snapshot_token_renewals_total",
        "Total number of Vault token acquisitions",
        &["status"]
    ).unwrap();
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Agent metrics recorder
pub struct AgentMetrics;

impl AgentMetrics {
    /// Record the end of a cycle (`completed`, `skipped` or `aborted`)
    pub fn record_cycle(outcome: &str) {
        SNAPSHOT_CYCLES.with_label_values(&[outcome]).inc();
    }

    /// Record a captured snapshot
    pub fn record_snapshot_bytes(len: usize) {
        SNAPSHOT_BYTES.inc_by(len as u64);
    }

    /// Record a persist attempt
    pub fn record_persist(backend: &str, success: bool) {
        BACKEND_PERSISTS.with_label_values(&[backend, status(success)]).inc();
    }

    /// Record a prune pass and the number of objects it removed
    pub fn record_prune(backend: &str, success: bool, deleted: usize) {
        BACKEND_PRUNES.with_label_values(&[backend, status(success)]).inc();
        OBJECTS_PRUNED.with_label_values(&[backend]).inc_by(deleted as u64);
    }

    /// Record a token acquisition
    pub fn record_token_renewal(success: bool) {
        TOKEN_RENEWALS.with_label_values(&[status(success)]).inc();
    }

    /// Get all agent metrics in Prometheus text format
    pub fn export_metrics() -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("Failed to encode metrics: {}", e))?;
        String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
    }
}
