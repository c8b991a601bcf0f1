//! File-based session storage implementation.
//!
//! Directory structure:
//! ```text
//! {sessions_dir}/
//!   {session_id}/
//!     events.jsonl          # Append-only event log
//!     events.archive.jsonl  # Compacted-out events (archive mode)
//!     state.json            # Atomic checkpoint snapshot
//! ```
//!
//! The claim-check codec runs on every line and document written here. An
//! oversized event is stored as an envelope line carrying its `seq` so
//! that `after_seq` filtering and compaction work without fetching the
//! blob.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::codec::ClaimCheckCodec;
use crate::session::{SessionEvent, SessionSnapshot};
use crate::store::error::{StorageError, StorageResult};
use crate::store::session::SessionStore;

/// File-based implementation of `SessionStore`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    codec: ClaimCheckCodec,
}

impl FileSessionStore {
    /// Create a new file session store.
    ///
    /// The sessions directory is created when the first session is stored.
    pub fn new(sessions_dir: impl Into<PathBuf>, codec: ClaimCheckCodec) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            codec,
        }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    fn events_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("events.jsonl")
    }

    fn snapshot_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("state.json")
    }

    async fn ensure_session_dir(&self, session_id: &str) -> StorageResult<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))
    }

    /// Encode one event into its stored line value.
    ///
    /// If the codec claim-checks the event, the envelope keeps the `seq`
    /// so the log stays filterable without blob fetches.
    async fn encode_event(&self, session_id: &str, event: &SessionEvent) -> StorageResult<Value> {
        let value = serde_json::to_value(event)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        let seq = event.seq;

        let mut encoded = self.codec.encode(session_id, value).await?;
        if let Some(obj) = encoded.as_object_mut()
            && !obj.contains_key("seq")
        {
            let _ = obj.insert("seq".to_string(), seq.into());
        }
        Ok(encoded)
    }

    /// Decode one stored line value back into an event.
    async fn decode_event(
        &self,
        session_id: &str,
        value: Value,
    ) -> StorageResult<Option<SessionEvent>> {
        let decoded = self.codec.decode(session_id, value).await?;
        // Skip lines that no longer match the event schema.
        Ok(serde_json::from_value(decoded).ok())
    }
}

/// Sequence number of a stored line, readable on both plain events and
/// claim-check envelopes.
fn line_seq(value: &Value) -> Option<u64> {
    value.get("seq").and_then(Value::as_u64)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    // ========================================================================
    // Index / Lifecycle
    // ========================================================================

    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut sessions = Vec::new();

        let mut entries = match fs::read_dir(&self.sessions_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.sessions_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.sessions_dir, e))?
        {
            let path = entry.path();
            if path.is_dir()
                && path.join("state.json").exists()
                && let Some(name) = path.file_name()
            {
                sessions.push(name.to_string_lossy().to_string());
            }
        }

        Ok(sessions)
    }

    async fn delete(&self, session_id: &str) -> StorageResult<()> {
        let dir = self.session_dir(session_id);

        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }

    // ========================================================================
    // Events (append-only)
    // ========================================================================

    async fn load_events(
        &self,
        session_id: &str,
        after_seq: u64,
    ) -> StorageResult<Vec<SessionEvent>> {
        let path = self.events_path(session_id);

        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

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

            // Filter before decoding so skipped events never cost a fetch.
            if line_seq(&value).is_some_and(|seq| seq <= after_seq) {
                continue;
            }

            if let Some(event) = self.decode_event(session_id, value).await? {
                events.push(event);
            }
        }

        Ok(events)
    }

    async fn append_events(&self, session_id: &str, events: &[SessionEvent]) -> StorageResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        self.ensure_session_dir(session_id).await?;
        let path = self.events_path(session_id);

        let mut buffer = String::new();
        for event in events {
            let value = self.encode_event(session_id, event).await?;
            let line = serde_json::to_string(&value)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        // fsync for durability
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(())
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    async fn load_snapshot(&self, session_id: &str) -> StorageResult<Option<SessionSnapshot>> {
        let path = self.snapshot_path(session_id);

        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let value: Value = serde_json::from_str(&contents)
            .map_err(|e| StorageError::deserialization(&path, e.to_string()))?;
        let decoded = self.codec.decode(session_id, value).await?;

        let snapshot: SessionSnapshot = serde_json::from_value(decoded)
            .map_err(|e| StorageError::deserialization(&path, e.to_string()))?;

        if !snapshot.is_compatible() {
            return Err(StorageError::incompatible_schema(
                &path,
                SessionSnapshot::SCHEMA_VERSION,
                &snapshot.schema_version,
            ));
        }

        Ok(Some(snapshot))
    }

    async fn save_snapshot(
        &self,
        session_id: &str,
        snapshot: &SessionSnapshot,
    ) -> StorageResult<()> {
        self.ensure_session_dir(session_id).await?;

        let final_path = self.snapshot_path(session_id);
        let temp_path = self.session_dir(session_id).join("state.json.tmp");

        let value = serde_json::to_value(snapshot)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        let encoded = self.codec.encode(session_id, value).await?;
        let contents = serde_json::to_string_pretty(&encoded)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        // Write to temp file first, then atomic rename.
        fs::write(&temp_path, contents.as_bytes())
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| StorageError::io(&final_path, e))?;

        Ok(())
    }

    // ========================================================================
    // Compaction
    // ========================================================================

    async fn compact_events(
        &self,
        session_id: &str,
        up_to_seq: u64,
        archive: bool,
    ) -> StorageResult<()> {
        let path = self.events_path(session_id);

        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let mut old_lines = Vec::new();
        let mut retained_lines = Vec::new();

        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Unparseable lines are retained (safe default).
            match serde_json::from_str::<Value>(trimmed).ok().and_then(|v| line_seq(&v)) {
                Some(seq) if seq <= up_to_seq => old_lines.push(line),
                _ => retained_lines.push(line),
            }
        }

        if old_lines.is_empty() {
            return Ok(());
        }

        if archive {
            let archive_path = self.session_dir(session_id).join("events.archive.jsonl");
            let mut archive_buf = String::new();
            for line in &old_lines {
                archive_buf.push_str(line);
                archive_buf.push('\n');
            }

            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&archive_path)
                .await
                .map_err(|e| StorageError::io(&archive_path, e))?;
            file.write_all(archive_buf.as_bytes())
                .await
                .map_err(|e| StorageError::io(&archive_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| StorageError::io(&archive_path, e))?;
        }

        let temp_path = self.session_dir(session_id).join("events.jsonl.tmp");
        let mut retained_buf = String::new();
        for line in &retained_lines {
            retained_buf.push_str(line);
            retained_buf.push('\n');
        }

        fs::write(&temp_path, retained_buf.as_bytes())
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SessionStatus;
    use crate::routing::RoutingContext;
    use crate::session::{SessionEventPayload, TranscriptEntry};
    use crate::store::file::FileContentStore;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_store(temp_dir: &TempDir) -> FileSessionStore {
        create_store_with_threshold(temp_dir, crate::codec::DEFAULT_THRESHOLD_BYTES)
    }

    fn create_store_with_threshold(temp_dir: &TempDir, threshold: usize) -> FileSessionStore {
        let content = Arc::new(FileContentStore::new(temp_dir.path().join("blobs")));
        let codec = ClaimCheckCodec::new(content, threshold);
        FileSessionStore::new(temp_dir.path().join("sessions"), codec)
    }

    fn user_event(seq: u64, content: &str) -> SessionEvent {
        SessionEvent::new(
            seq,
            SessionEventPayload::UserMessage {
                content: content.to_string(),
            },
        )
    }

    fn test_snapshot(session_id: &str, last_seq: u64) -> SessionSnapshot {
        SessionSnapshot {
            schema_version: SessionSnapshot::SCHEMA_VERSION.to_string(),
            session_id: session_id.to_string(),
            status: SessionStatus::Idle,
            created_at: Utc::now(),
            snapshot_at: Utc::now(),
            last_event_seq: last_seq,
            checkpoint_seq: last_seq,
            transcript: vec![TranscriptEntry::user("Hello")],
            active_role: "supervisor".to_string(),
            routing_context: RoutingContext::new(),
            terminating: false,
            pending_events: vec![],
        }
    }

    #[tokio::test]
    async fn append_and_load_events() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let events: Vec<_> = (1..=3).map(|i| user_event(i, &format!("msg{i}"))).collect();
        store.append_events("session1", &events).await.unwrap();

        let loaded = store.load_events("session1", 0).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].seq, 1);
        assert_eq!(loaded[2].seq, 3);
    }

    #[tokio::test]
    async fn load_events_after_seq() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let events: Vec<_> = (1..=5).map(|i| user_event(i, &format!("msg{i}"))).collect();
        store.append_events("session1", &events).await.unwrap();

        let loaded = store.load_events("session1", 3).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].seq, 4);
        assert_eq!(loaded[1].seq, 5);
    }

    #[tokio::test]
    async fn load_events_nonexistent_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let events = store.load_events("nonexistent", 0).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn oversized_event_roundtrips_through_claim_check() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store_with_threshold(&temp_dir, 128);

        let big = "x".repeat(1024);
        store
            .append_events("session1", &[user_event(1, &big), user_event(2, "small")])
            .await
            .unwrap();

        // The stored line for the big event is an envelope with a seq.
        let raw = fs::read_to_string(temp_dir.path().join("sessions/session1/events.jsonl"))
            .await
            .unwrap();
        let first: Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(first["marker"], crate::codec::CLAIM_CHECK_MARKER);
        assert_eq!(first["seq"], 1);

        // Loading decodes transparently.
        let loaded = store.load_events("session1", 0).await.unwrap();
        assert_eq!(loaded.len(), 2);
        match &loaded[0].payload {
            SessionEventPayload::UserMessage { content } => assert_eq!(content, &big),
            other => panic!("unexpected payload: {other:?}"),
        }

        // after_seq filtering works without decoding the envelope.
        let loaded = store.load_events("session1", 1).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].seq, 2);
    }

    #[tokio::test]
    async fn save_and_load_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let snapshot = test_snapshot("session1", 42);
        store.save_snapshot("session1", &snapshot).await.unwrap();

        let loaded = store.load_snapshot("session1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "session1");
        assert_eq!(loaded.last_event_seq, 42);
        assert_eq!(loaded.active_role, "supervisor");
    }

    #[tokio::test]
    async fn load_snapshot_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        assert!(store.load_snapshot("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incompatible_snapshot_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let mut snapshot = test_snapshot("session1", 1);
        snapshot.schema_version = "99".to_string();
        store.save_snapshot("session1", &snapshot).await.unwrap();

        let err = store.load_snapshot("session1").await.unwrap_err();
        assert!(matches!(err, StorageError::IncompatibleSchema { .. }));
    }

    #[tokio::test]
    async fn list_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        for id in ["session1", "session2"] {
            store.save_snapshot(id, &test_snapshot(id, 1)).await.unwrap();
        }

        let mut sessions = store.list().await.unwrap();
        sessions.sort();
        assert_eq!(sessions, vec!["session1", "session2"]);
    }

    #[tokio::test]
    async fn list_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        store
            .append_events("session1", &[user_event(1, "test")])
            .await
            .unwrap();
        store
            .save_snapshot("session1", &test_snapshot("session1", 1))
            .await
            .unwrap();

        store.delete("session1").await.unwrap();

        assert!(store.load_snapshot("session1").await.unwrap().is_none());
        assert!(store.load_events("session1", 0).await.unwrap().is_empty());

        // Deleting a nonexistent session is fine.
        store.delete("session1").await.unwrap();
    }

    #[tokio::test]
    async fn compact_events_discard_mode() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let events: Vec<_> = (1..=5).map(|i| user_event(i, &format!("msg{i}"))).collect();
        store.append_events("session1", &events).await.unwrap();

        store.compact_events("session1", 3, false).await.unwrap();

        let remaining = store.load_events("session1", 0).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].seq, 4);

        let archive_path = temp_dir
            .path()
            .join("sessions/session1/events.archive.jsonl");
        assert!(!archive_path.exists());
    }

    #[tokio::test]
    async fn compact_events_archive_mode() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let events: Vec<_> = (1..=5).map(|i| user_event(i, &format!("msg{i}"))).collect();
        store.append_events("session1", &events).await.unwrap();

        store.compact_events("session1", 3, true).await.unwrap();

        let remaining = store.load_events("session1", 0).await.unwrap();
        assert_eq!(remaining.len(), 2);

        let archive_path = temp_dir
            .path()
            .join("sessions/session1/events.archive.jsonl");
        let archive_contents = fs::read_to_string(&archive_path).await.unwrap();
        assert_eq!(archive_contents.lines().filter(|l| !l.is_empty()).count(), 3);
    }

    #[tokio::test]
    async fn compact_noop_when_nothing_qualifies() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let events: Vec<_> = (5..=8).map(|i| user_event(i, &format!("msg{i}"))).collect();
        store.append_events("session1", &events).await.unwrap();

        store.compact_events("session1", 2, false).await.unwrap();
        assert_eq!(store.load_events("session1", 0).await.unwrap().len(), 4);

        // Compacting a session with no log at all is a no-op too.
        store.compact_events("ghost", 10, false).await.unwrap();
    }
}
