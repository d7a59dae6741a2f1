//! Local directory backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{BackendKind, CapturedSnapshot, PersistError, PruneError, SnapshotBackend, SnapshotObject};

/// Writes snapshots as files into a directory
pub struct LocalBackend {
    directory: PathBuf,
}

impl LocalBackend {
    /// Backend for `directory`; it is created on first persist
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Target directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn ensure_directory_exists(&self) -> Result<(), PersistError> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| PersistError::Io {
                path: self.directory.clone(),
                source,
            })
    }

    async fn write_file(path: &Path, snapshot: &CapturedSnapshot) -> std::io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(snapshot.data()).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl SnapshotBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn destination(&self) -> String {
        self.directory.display().to_string()
    }

    async fn persist(&self, snapshot: &CapturedSnapshot) -> Result<String, PersistError> {
        self.ensure_directory_exists().await?;

        let path = self.directory.join(snapshot.object_name());
        Self::write_file(&path, snapshot)
            .await
            .map_err(|source| PersistError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(path.display().to_string())
    }

    async fn list_objects(&self) -> Result<Vec<SnapshotObject>, PruneError> {
        let list_error = |e: std::io::Error| {
            PruneError::List(format!("{}: {}", self.directory.display(), e))
        };

        let mut entries = fs::read_dir(&self.directory).await.map_err(list_error)?;
        let mut objects = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            let metadata = entry.metadata().await.map_err(list_error)?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().map_err(list_error)?;

            objects.push(SnapshotObject {
                name: entry.file_name().to_string_lossy().into_owned(),
                last_modified: DateTime::<Utc>::from(modified),
                locator: entry.path().display().to_string(),
            });
        }

        Ok(objects)
    }

    async fn delete_object(&self, object: &SnapshotObject) -> Result<(), PruneError> {
        fs::remove_file(&object.locator)
            .await
            .map_err(|e| PruneError::Delete {
                name: object.name.clone(),
                reason: e.to_string(),
            })
    }
}
