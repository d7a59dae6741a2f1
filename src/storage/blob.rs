//! Backend over any [`ObjectStore`]; used for Google Cloud Storage and Azure Blob.
//!
//! Snapshots are stored at the root of the bucket or container. Large snapshots are
//! streamed with a multipart writer that keeps a bounded number of chunks in flight.

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use std::sync::Arc;
use tracing::warn;

use super::{BackendKind, CapturedSnapshot, PersistError, PruneError, SnapshotBackend, SnapshotObject};

/// Chunk size for multipart uploads
pub const UPLOAD_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Maximum number of chunks uploading concurrently
pub const MAX_IN_FLIGHT_CHUNKS: usize = 16;

/// Snapshot backend for a bucket or container exposed through `object_store`
pub struct ObjectStoreBackend {
    kind: BackendKind,
    store: Arc<dyn ObjectStore>,
    base_url: String,
}

impl ObjectStoreBackend {
    /// `base_url` is the public address of the bucket or container and prefixes the
    /// locators reported after a persist.
    pub fn new(kind: BackendKind, store: Arc<dyn ObjectStore>, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn upload_multipart(&self, path: &ObjectPath, snapshot: &CapturedSnapshot) -> Result<(), PersistError> {
        let upload = self.store.put_multipart(path).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, UPLOAD_CHUNK_SIZE);

        for chunk in snapshot.data().chunks(UPLOAD_CHUNK_SIZE) {
            if let Err(e) = writer.wait_for_capacity(MAX_IN_FLIGHT_CHUNKS).await {
                if let Err(abort_error) = writer.abort().await {
                    warn!(path = %path, error = %abort_error, "Failed to abort multipart upload");
                }
                return Err(e.into());
            }
            writer.write(chunk);
        }

        writer.finish().await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotBackend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn destination(&self) -> String {
        self.base_url.clone()
    }

    async fn persist(&self, snapshot: &CapturedSnapshot) -> Result<String, PersistError> {
        let path = ObjectPath::from(snapshot.object_name());

        if snapshot.len() <= UPLOAD_CHUNK_SIZE {
            self.store
                .put(&path, PutPayload::from(snapshot.data().clone()))
                .await?;
        } else {
            self.upload_multipart(&path, snapshot).await?;
        }

        Ok(format!("{}/{}", self.base_url, path))
    }

    async fn list_objects(&self) -> Result<Vec<SnapshotObject>, PruneError> {
        // Delimited listing returns only objects at the root, never nested keys
        let listing = self
            .store
            .list_with_delimiter(None)
            .await
            .map_err(|e| PruneError::List(e.to_string()))?;

        Ok(listing
            .objects
            .into_iter()
            .map(|meta| SnapshotObject {
                name: meta.location.filename().unwrap_or_default().to_string(),
                last_modified: meta.last_modified,
                locator: meta.location.to_string(),
            })
            .collect())
    }

    async fn delete_object(&self, object: &SnapshotObject) -> Result<(), PruneError> {
        match self.store.delete(&ObjectPath::from(object.locator.as_str())).await {
            Ok(()) => Ok(()),
            Err(error @ object_store::Error::NotFound { .. }) => {
                warn!(name = %object.name, error = %error, "Snapshot already gone");
                Ok(())
            }
            Err(e) => Err(PruneError::Delete {
                name: object.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
