//! Persisted interaction history trait.
//!
//! The interaction history is the externally visible session record. It is
//! written after every turn and read on cold start, so `get-history` can be
//! answered before any event has been drained. It is deliberately separate
//! from the event log: checkpoints carry the transcript, never the history.

use async_trait::async_trait;

use crate::session::ChatInteraction;

use super::error::StorageResult;

/// Storage interface for the append-only interaction history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one interaction to the session's history.
    async fn append(&self, session_id: &str, interaction: &ChatInteraction) -> StorageResult<()>;

    /// Load the full ordered history for a session.
    ///
    /// Returns an empty list for unknown sessions.
    async fn load(&self, session_id: &str) -> StorageResult<Vec<ChatInteraction>>;

    /// Delete the history for a session.
    async fn delete(&self, session_id: &str) -> StorageResult<()>;
}
