//! Snapshot storage backends
//!
//! Each backend implements the same persist-then-prune protocol through
//! [`SnapshotBackend`]: `persist` writes one new object, and `prune` lists the
//! destination, keeps only canonically named snapshots, and deletes the oldest ones
//! beyond the retention count.

pub mod azure;
pub mod blob;
pub mod gcs;
pub mod local;
pub mod naming;
pub mod retention;
pub mod s3;
mod tls;

pub use blob::ObjectStoreBackend;
pub use local::LocalBackend;
pub use naming::{is_snapshot_name, snapshot_name, SNAPSHOT_PREFIX, SNAPSHOT_SUFFIX};
pub use retention::{sort_oldest_first, RetentionPolicy, Timestamped};
pub use s3::S3Backend;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Configuration;

/// Errors raised while constructing a backend at startup
#[derive(Error, Debug)]
pub enum BackendInitError {
    /// A configured block is missing a required value
    #[error("invalid backend configuration: {0}")]
    Config(String),

    /// The custom CA bundle could not be read
    #[error("cannot read CA certificate {path}: {source}")]
    CaCert {
        /// Bundle location from the configuration
        path: PathBuf,
        /// Underlying read failure
        #[source]
        source: std::io::Error,
    },

    /// The TLS client could not be built
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// The object_store builder rejected the configuration
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Errors writing a snapshot; fatal only to that backend's attempt
#[derive(Error, Debug)]
pub enum PersistError {
    /// Local filesystem failure
    #[error("cannot write {path}: {source}")]
    Io {
        /// File or directory being written
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// A remote put or multipart step failed
    #[error("upload failed: {0}")]
    Upload(String),

    /// GCS or Azure write failure
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Errors pruning old snapshots; the freshly persisted object is unaffected
#[derive(Error, Debug)]
pub enum PruneError {
    /// The destination could not be listed; nothing was deleted
    #[error("cannot list existing snapshots: {0}")]
    List(String),

    /// First deletion that failed; later candidates were still attempted
    #[error("cannot delete old snapshot {name}: {reason}")]
    Delete {
        /// Object that could not be deleted
        name: String,
        /// Backend error text
        reason: String,
    },
}

/// Storage technology of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Directory on the agent host
    Local,
    /// Amazon S3 or an S3-compatible endpoint
    Aws,
    /// Google Cloud Storage
    Gcp,
    /// Azure Blob Storage
    Azure,
}

impl BackendKind {
    /// Lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Aws => "aws",
            BackendKind::Gcp => "gcp",
            BackendKind::Azure => "azure",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured snapshot, buffered once and shared by every backend.
///
/// Cloning is cheap: each backend reads through its own handle to the same
/// allocation.
#[derive(Clone)]
pub struct CapturedSnapshot {
    data: Bytes,
    captured_at: DateTime<Utc>,
}

impl CapturedSnapshot {
    /// Wrap bytes read from the snapshot endpoint at `captured_at`
    pub fn new(data: Bytes, captured_at: DateTime<Utc>) -> Self {
        Self { data, captured_at }
    }

    /// Snapshot contents
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the snapshot holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Instant the snapshot was read
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Capture time in nanoseconds since the epoch, saturating outside the
    /// representable range.
    pub fn timestamp_nanos(&self) -> i64 {
        self.captured_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| self.captured_at.timestamp().saturating_mul(1_000_000_000))
    }

    /// Canonical object name for this snapshot
    pub fn object_name(&self) -> String {
        snapshot_name(self.timestamp_nanos())
    }

    /// Hex SHA-256 of the contents, logged after each capture
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(&self.data))
    }
}

impl fmt::Debug for CapturedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedSnapshot")
            .field("len", &self.data.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// An object found at a backend's destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotObject {
    /// Final name component (file name, blob name, last key segment)
    pub name: String,
    /// Modification time reported by the destination
    pub last_modified: DateTime<Utc>,
    /// Backend-specific address used to delete the object
    pub locator: String,
}

impl Timestamped for SnapshotObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

/// What a prune pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Canonically named snapshots found at the destination
    pub snapshots_found: usize,
    /// Names deleted, oldest first
    pub deleted: Vec<String>,
}

/// Persist-then-prune protocol implemented by every storage technology
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Storage technology, used as the backend label
    fn kind(&self) -> BackendKind;

    /// Human-readable destination used in logs
    fn destination(&self) -> String;

    /// Write the snapshot as a new object and return its locator.
    async fn persist(&self, snapshot: &CapturedSnapshot) -> Result<String, PersistError>;

    /// All objects at the destination, snapshot or not. Pruning filters them.
    async fn list_objects(&self) -> Result<Vec<SnapshotObject>, PruneError>;

    /// Remove one object returned by `list_objects`.
    async fn delete_object(&self, object: &SnapshotObject) -> Result<(), PruneError>;

    /// Apply `policy` to the destination.
    async fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport, PruneError> {
        prune_snapshots(self, policy).await
    }
}

/// Shared prune protocol: list, keep canonical names, sort oldest first, delete the
/// excess. Every selected object is attempted; the first failure is returned.
pub async fn prune_snapshots<B>(backend: &B, policy: &RetentionPolicy) -> Result<PruneReport, PruneError>
where
    B: SnapshotBackend + ?Sized,
{
    if policy.is_disabled() {
        return Ok(PruneReport::default());
    }

    let snapshots: Vec<SnapshotObject> = backend
        .list_objects()
        .await?
        .into_iter()
        .filter(|object| is_snapshot_name(&object.name))
        .collect();

    let mut report = PruneReport {
        snapshots_found: snapshots.len(),
        deleted: Vec::new(),
    };
    let mut first_error = None;

    for object in policy.select_expired(snapshots) {
        debug!(backend = %backend.kind(), name = %object.name, "Deleting old snapshot");
        match backend.delete_object(&object).await {
            Ok(()) => report.deleted.push(object.name),
            Err(e) => {
                warn!(backend = %backend.kind(), name = %object.name, error = %e, "Cannot delete old snapshot");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// Construct one adapter per enabled backend block, in the order local, S3, GCS,
/// Azure. Any construction failure aborts startup.
pub async fn build_backends(config: &Configuration) -> Result<Vec<Arc<dyn SnapshotBackend>>, BackendInitError> {
    let mut backends: Vec<Arc<dyn SnapshotBackend>> = Vec::new();

    if config.local.is_enabled() {
        backends.push(Arc::new(LocalBackend::new(&config.local.path)));
    }
    if config.aws.is_enabled() {
        backends.push(Arc::new(S3Backend::new(&config.aws).await?));
    }
    if config.gcp.is_enabled() {
        backends.push(Arc::new(gcs::gcs_backend(&config.gcp)?));
    }
    if config.azure.is_enabled() {
        backends.push(Arc::new(azure::azure_backend(&config.azure)?));
    }

    for backend in &backends {
        info!(backend = %backend.kind(), destination = %backend.destination(), "Configured snapshot backend");
    }

    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_captured_snapshot_name_embeds_nanos() {
        let captured_at = Utc.timestamp_opt(1_700_000_000, 42).unwrap();
        let snapshot = CapturedSnapshot::new(Bytes::from_static(b"raft"), captured_at);

        assert_eq!(snapshot.timestamp_nanos(), 1_700_000_000_000_000_042);
        assert_eq!(snapshot.object_name(), "raft_snapshot-1700000000000000042.snap");
        assert_eq!(snapshot.len(), 4);
    }

    #[test]
    fn test_clones_share_the_buffer() {
        let snapshot = CapturedSnapshot::new(Bytes::from(vec![7u8; 1024]), Utc::now());
        let copy = snapshot.clone();
        assert_eq!(snapshot.data().as_ptr(), copy.data().as_ptr());
    }

    #[test]
    fn test_sha256_hex() {
        let snapshot = CapturedSnapshot::new(Bytes::from_static(b"abc"), Utc::now());
        assert_eq!(
            snapshot.sha256_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
