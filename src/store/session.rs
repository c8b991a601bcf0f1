//! Session storage trait.
//!
//! Defines the interface for persisting the per-session event log and
//! checkpoint snapshots.

use async_trait::async_trait;

use crate::session::{SessionEvent, SessionSnapshot};

use super::error::StorageResult;

/// Storage interface for session persistence.
///
/// Combines an append-only event log with point-in-time checkpoint records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    // ========================================================================
    // Index / Lifecycle
    // ========================================================================

    /// List all session IDs.
    ///
    /// Used for recovery on startup.
    async fn list(&self) -> StorageResult<Vec<String>>;

    /// Delete a session and all its data.
    async fn delete(&self, session_id: &str) -> StorageResult<()>;

    // ========================================================================
    // Events (append-only)
    // ========================================================================

    /// Load events with sequence number greater than `after_seq`.
    ///
    /// Used for replaying events after loading a checkpoint.
    async fn load_events(
        &self,
        session_id: &str,
        after_seq: u64,
    ) -> StorageResult<Vec<SessionEvent>>;

    /// Append events to the session's event log.
    ///
    /// Events must be persisted durably before returning.
    async fn append_events(&self, session_id: &str, events: &[SessionEvent]) -> StorageResult<()>;

    // ========================================================================
    // Checkpoints
    // ========================================================================

    /// Load the most recent checkpoint for a session.
    ///
    /// Returns `Ok(None)` if no checkpoint exists yet.
    async fn load_snapshot(&self, session_id: &str) -> StorageResult<Option<SessionSnapshot>>;

    /// Save a checkpoint for a session.
    ///
    /// Must be atomic - either fully succeeds or has no effect.
    async fn save_snapshot(
        &self,
        session_id: &str,
        snapshot: &SessionSnapshot,
    ) -> StorageResult<()>;

    // ========================================================================
    // Compaction
    // ========================================================================

    /// Remove events with `seq <= up_to_seq` from the event log.
    ///
    /// If `archive` is true, removed events are appended to an archive log
    /// first. Safe to call after a checkpoint covering these events.
    async fn compact_events(
        &self,
        session_id: &str,
        up_to_seq: u64,
        archive: bool,
    ) -> StorageResult<()>;
}
