//! File-based interaction history store.
//!
//! One `history.jsonl` per session under the history directory. Written
//! after every turn; read on cold start so history queries never depend on
//! the session actor being live. Claim-checked like every other store
//! document.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::codec::ClaimCheckCodec;
use crate::session::ChatInteraction;
use crate::store::HistoryStore;
use crate::store::error::{StorageError, StorageResult};

/// File-backed implementation of `HistoryStore`.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    history_dir: PathBuf,
    codec: ClaimCheckCodec,
}

impl FileHistoryStore {
    /// Create a new file history store.
    pub fn new(history_dir: impl Into<PathBuf>, codec: ClaimCheckCodec) -> Self {
        Self {
            history_dir: history_dir.into(),
            codec,
        }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.history_dir.join(session_id)
    }

    fn history_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("history.jsonl")
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn append(&self, session_id: &str, interaction: &ChatInteraction) -> StorageResult<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let value = serde_json::to_value(interaction)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        let encoded = self.codec.encode(session_id, value).await?;
        let mut line = serde_json::to_string(&encoded)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        line.push('\n');

        let path = self.history_path(session_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    async fn load(&self, session_id: &str) -> StorageResult<Vec<ChatInteraction>> {
        let path = self.history_path(session_id);

        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut interactions = Vec::new();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| StorageError::io(&path, e))?
        {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Skip malformed lines (crash recovery).
            let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
                continue;
            };

            let decoded = self.codec.decode(session_id, value).await?;
            if let Ok(interaction) = serde_json::from_value(decoded) {
                interactions.push(interaction);
            }
        }

        Ok(interactions)
    }

    async fn delete(&self, session_id: &str) -> StorageResult<()> {
        let dir = self.session_dir(session_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileContentStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_store(temp_dir: &TempDir, threshold: usize) -> FileHistoryStore {
        let content = Arc::new(FileContentStore::new(temp_dir.path().join("blobs")));
        let codec = ClaimCheckCodec::new(content, threshold);
        FileHistoryStore::new(temp_dir.path().join("history"), codec)
    }

    fn interaction(prompt: &str, response: &str) -> ChatInteraction {
        ChatInteraction {
            user_prompt: prompt.to_string(),
            text_response: response.to_string(),
            structured_response: String::new(),
            trace: String::new(),
        }
    }

    #[tokio::test]
    async fn append_and_load_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, crate::codec::DEFAULT_THRESHOLD_BYTES);

        for i in 1..=4 {
            store
                .append("session1", &interaction(&format!("q{i}"), &format!("a{i}")))
                .await
                .unwrap();
        }

        let loaded = store.load("session1").await.unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[0].user_prompt, "q1");
        assert_eq!(loaded[3].user_prompt, "q4");
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, crate::codec::DEFAULT_THRESHOLD_BYTES);
        assert!(store.load("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_interaction_roundtrips() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, 128);

        let big = interaction("list everything", &"x".repeat(1024));
        store.append("session1", &big).await.unwrap();

        let loaded = store.load("session1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], big);
    }

    #[tokio::test]
    async fn delete_removes_history() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, crate::codec::DEFAULT_THRESHOLD_BYTES);

        store.append("session1", &interaction("q", "a")).await.unwrap();
        store.delete("session1").await.unwrap();
        assert!(store.load("session1").await.unwrap().is_empty());
    }
}
