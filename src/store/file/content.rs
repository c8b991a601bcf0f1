//! File-based content store for claim-checked blobs.
//!
//! Blobs live under `{blobs_dir}/{session_id}/{token}`, one file each.
//! Deleting a session removes its whole namespace, which is the blob
//! retention policy: blobs live exactly as long as their session.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::store::error::{StorageError, StorageResult};
use crate::store::ContentStore;

/// File-backed implementation of `ContentStore`.
#[derive(Debug, Clone)]
pub struct FileContentStore {
    blobs_dir: PathBuf,
}

impl FileContentStore {
    /// Create a new file content store rooted at `blobs_dir`.
    pub fn new(blobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            blobs_dir: blobs_dir.into(),
        }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.blobs_dir.join(session_id)
    }

    fn blob_path(&self, session_id: &str, token: &str) -> PathBuf {
        self.session_dir(session_id).join(token)
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn put(&self, session_id: &str, token: &str, bytes: &[u8]) -> StorageResult<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let path = self.blob_path(session_id, token);
        fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    async fn get(&self, session_id: &str, token: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.blob_path(session_id, token);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    async fn delete_session(&self, session_id: &str) -> StorageResult<()> {
        let dir = self.session_dir(session_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }
}
