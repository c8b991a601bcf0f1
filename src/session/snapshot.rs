//! Checkpoint record schema.
//!
//! A checkpoint carries everything needed to reconstruct a session's
//! in-memory state: the accepted-message transcript (split at
//! `checkpoint_seq`), the active-role pointer, the routing context, the
//! termination flag, and any pending events carried over at compaction
//! time. Interaction history is never stored here (it lives in the
//! external history store), so reconstruction from checkpoint plus history
//! is indistinguishable from the pre-compaction session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::SessionStatus;
use crate::routing::RoutingContext;

use super::events::PendingEvent;
use super::interaction::TranscriptEntry;

/// A checkpoint of session state for recovery and compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Schema version for forward compatibility.
    pub schema_version: String,
    /// The session ID.
    pub session_id: String,
    /// Dispatch-loop status at snapshot time.
    pub status: SessionStatus,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When this snapshot was taken.
    pub snapshot_at: DateTime<Utc>,
    /// The sequence number of the last event covered by this snapshot.
    pub last_event_seq: u64,
    /// The sequence number up to which the transcript is checkpointed.
    ///
    /// Transcript entries produced by events after this sequence are
    /// reconstructed by replaying the event log.
    #[serde(default)]
    pub checkpoint_seq: u64,
    /// Accepted-message transcript up to `checkpoint_seq`.
    pub transcript: Vec<TranscriptEntry>,
    /// The currently active routing role.
    pub active_role: String,
    /// Free-form key/value routing state visible to all roles.
    #[serde(default)]
    pub routing_context: RoutingContext,
    /// Whether termination has been requested.
    #[serde(default)]
    pub terminating: bool,
    /// Pending events carried over at compaction time; requeued first on
    /// reconstruction.
    #[serde(default)]
    pub pending_events: Vec<PendingEvent>,
}

impl SessionSnapshot {
    /// Current schema version.
    pub const SCHEMA_VERSION: &'static str = "1";

    /// Check if this snapshot is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == Self::SCHEMA_VERSION
    }

    /// The sequence from which events must be replayed on recovery.
    pub fn replay_from_seq(&self) -> u64 {
        self.checkpoint_seq
    }
}
