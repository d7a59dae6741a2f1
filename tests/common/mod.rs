// Shared test doubles for the control plane and storage backends

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use raft_snapshot_agent::agent::SnapshotAgent;
use raft_snapshot_agent::storage::{
    prune_snapshots, BackendKind, CapturedSnapshot, PersistError, PruneError, PruneReport,
    RetentionPolicy, SnapshotBackend, SnapshotObject,
};
use raft_snapshot_agent::vault::{
    ControlPlane, ControlPlaneError, CredentialManager, LoginResponse, SnapshotError, TokenSource,
};

fn api_error(message: &str) -> ControlPlaneError {
    ControlPlaneError::Api {
        status: 500,
        message: message.to_string(),
    }
}

/// Control plane whose answers are toggled by the test
pub struct MockControlPlane {
    pub leader: AtomicBool,
    pub fail_leader: AtomicBool,
    pub fail_snapshot: AtomicBool,
    pub fail_login: AtomicBool,
    pub lease_seconds: AtomicU64,
    pub login_calls: AtomicUsize,
    pub leader_calls: AtomicUsize,
    pub snapshot_calls: AtomicUsize,
    pub tokens_seen: Mutex<Vec<String>>,
    pub snapshot: Bytes,
}

impl MockControlPlane {
    pub fn new(leader: bool) -> Self {
        Self {
            leader: AtomicBool::new(leader),
            fail_leader: AtomicBool::new(false),
            fail_snapshot: AtomicBool::new(false),
            fail_login: AtomicBool::new(false),
            lease_seconds: AtomicU64::new(3600),
            login_calls: AtomicUsize::new(0),
            leader_calls: AtomicUsize::new(0),
            snapshot_calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
            snapshot: Bytes::from_static(b"raft-snapshot-bytes"),
        }
    }

    pub fn with_lease(self, seconds: u64) -> Self {
        self.lease_seconds.store(seconds, Ordering::SeqCst);
        self
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn leader_checks(&self) -> usize {
        self.leader_calls.load(Ordering::SeqCst)
    }

    pub fn exports(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn approle_login(
        &self,
        _mount: &str,
        _role_id: &str,
        _secret_id: &str,
    ) -> Result<LoginResponse, ControlPlaneError> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(api_error("permission denied"));
        }
        Ok(LoginResponse {
            client_token: format!("token-{}", n),
            lease_duration: self.lease_seconds.load(Ordering::SeqCst),
        })
    }

    async fn is_leader(&self, token: &str) -> Result<bool, ControlPlaneError> {
        self.leader_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.to_string());
        if self.fail_leader.load(Ordering::SeqCst) {
            return Err(api_error("leader lookup failed"));
        }
        Ok(self.leader.load(Ordering::SeqCst))
    }

    async fn raft_snapshot(&self, _token: &str) -> Result<Bytes, SnapshotError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(SnapshotError::Request(api_error("snapshot failed")));
        }
        Ok(self.snapshot.clone())
    }
}

/// In-memory backend recording every call
pub struct MockBackend {
    pub kind: BackendKind,
    pub objects: Mutex<Vec<SnapshotObject>>,
    pub fail_persist: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_delete: Mutex<HashSet<String>>,
    pub persist_calls: AtomicUsize,
    pub prune_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub delete_attempts: Mutex<Vec<String>>,
    pub persisted_bytes: Mutex<Vec<Bytes>>,
}

impl MockBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            objects: Mutex::new(Vec::new()),
            fail_persist: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_delete: Mutex::new(HashSet::new()),
            persist_calls: AtomicUsize::new(0),
            prune_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            delete_attempts: Mutex::new(Vec::new()),
            persisted_bytes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: BackendKind) -> Self {
        let backend = Self::new(kind);
        backend.fail_persist.store(true, Ordering::SeqCst);
        backend
    }

    /// Seed an existing object with a modification time in seconds
    pub fn seed(&self, name: &str, modified_secs: i64) {
        self.objects.lock().unwrap().push(SnapshotObject {
            name: name.to_string(),
            last_modified: at(modified_secs),
            locator: name.to_string(),
        });
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.fail_delete.lock().unwrap().insert(name.to_string());
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|object| object.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn persists(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn prunes(&self) -> usize {
        self.prune_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn destination(&self) -> String {
        format!("mock://{}", self.kind)
    }

    async fn persist(&self, snapshot: &CapturedSnapshot) -> Result<String, PersistError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(PersistError::Upload("destination unavailable".to_string()));
        }

        let name = snapshot.object_name();
        self.persisted_bytes.lock().unwrap().push(snapshot.data().clone());
        self.objects.lock().unwrap().push(SnapshotObject {
            name: name.clone(),
            last_modified: snapshot.captured_at(),
            locator: name.clone(),
        });
        Ok(format!("{}/{}", self.destination(), name))
    }

    async fn list_objects(&self) -> Result<Vec<SnapshotObject>, PruneError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(PruneError::List("listing refused".to_string()));
        }
        Ok(self.objects.lock().unwrap().clone())
    }

    async fn delete_object(&self, object: &SnapshotObject) -> Result<(), PruneError> {
        self.delete_attempts.lock().unwrap().push(object.name.clone());
        if self.fail_delete.lock().unwrap().contains(&object.name) {
            return Err(PruneError::Delete {
                name: object.name.clone(),
                reason: "access denied".to_string(),
            });
        }
        self.objects.lock().unwrap().retain(|existing| existing.name != object.name);
        Ok(())
    }

    async fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport, PruneError> {
        self.prune_calls.fetch_add(1, Ordering::SeqCst);
        prune_snapshots(self, policy).await
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn approle() -> TokenSource {
    TokenSource::AppRole {
        mount: "approle".to_string(),
        role_id: "role".to_string(),
        secret_id: "secret".to_string(),
    }
}

/// Agent logged in through `control_plane` with the given backends
pub async fn agent_with(
    control_plane: Arc<MockControlPlane>,
    backends: Vec<Arc<dyn SnapshotBackend>>,
    retain: u64,
) -> SnapshotAgent {
    let credentials = CredentialManager::login(approle(), control_plane.as_ref())
        .await
        .expect("Failed to log in against mock control plane");
    SnapshotAgent::new(credentials, control_plane, backends, RetentionPolicy::new(retain))
}
