//! Session actor types and protocol.
//!
//! Defines the command protocol for communicating with session actors,
//! along with configuration and error types.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::api::SessionStatus;
use crate::routing::RoutingContext;
use crate::store::{HistoryStore, SessionStore};

use super::interaction::{ChatInteraction, TranscriptEntry};
use super::snapshot::SessionSnapshot;
use super::turn::TurnEngine;

// ============================================================================
// Session Command
// ============================================================================

/// Commands that can be sent to a session actor.
pub enum SessionCommand {
    /// Fire-and-forget user message; acknowledged once enqueued.
    SubmitUserMessage {
        content: String,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    /// Fire-and-forget external status; acknowledged once enqueued.
    SubmitExternalStatus {
        content: String,
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    /// Synchronous message: replies with the interactions appended by the
    /// turn this event produced.
    ProcessMessage {
        content: String,
        reply: oneshot::Sender<Result<Vec<ChatInteraction>, ActorError>>,
    },
    /// Request cooperative termination; queued events still drain.
    Terminate {
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    /// Host growth signal: compact at the next safe point.
    RequestCompaction {
        reply: oneshot::Sender<Result<(), ActorError>>,
    },

    // Read operations
    GetHistory {
        reply: oneshot::Sender<Result<Vec<ChatInteraction>, ActorError>>,
    },
    GetMetadata {
        reply: oneshot::Sender<Result<SessionMetadata, ActorError>>,
    },

    // Flush / snapshot
    ForceFlush {
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
    ForceSnapshot {
        reply: oneshot::Sender<Result<(), ActorError>>,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors from actor operations.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The actor has shut down.
    #[error("actor has shut down")]
    ActorShutdown,

    /// The session has ended; synchronous turns are no longer possible.
    #[error("session has ended")]
    SessionEnded,

    /// Input rejected before enqueueing.
    #[error("invalid input: {0}")]
    Validation(String),

    /// IO error during persistence.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The turn failed; the error trace was recorded in history.
    #[error("turn failed: {0}")]
    Turn(String),
}

// ============================================================================
// Metadata
// ============================================================================

/// Metadata about a session (returned by GetMetadata).
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub id: String,
    pub status: SessionStatus,
    pub active_role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_event_seq: u64,
    pub queued_events: usize,
}

// ============================================================================
// Configuration
// ============================================================================

/// Compaction behavior for the checkpoint compactor.
#[derive(Debug, Clone)]
pub struct CompactionSettings {
    /// Whether the event-count trigger is active. Explicit compaction
    /// requests are honored either way.
    pub enabled: bool,
    /// Flushed events beyond the checkpoint before compaction triggers.
    pub event_threshold: u64,
    /// Whether compacted-out events are archived rather than discarded.
    pub archive: bool,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            event_threshold: 200,
            archive: false,
        }
    }
}

/// Configuration for spawning a new actor.
pub struct ActorConfig {
    pub id: String,
    pub engine: TurnEngine,
    pub store: Arc<dyn SessionStore>,
    pub history_store: Arc<dyn HistoryStore>,
    pub compaction: CompactionSettings,
    /// Initial routing context (e.g. a seeded client id).
    pub initial_context: RoutingContext,
    /// Receiver for worker-process status lines.
    pub status_rx: mpsc::UnboundedReceiver<String>,
}

/// Configuration for recovering an actor from a checkpoint.
pub struct RecoverConfig {
    pub snapshot: SessionSnapshot,
    pub engine: TurnEngine,
    pub store: Arc<dyn SessionStore>,
    pub history_store: Arc<dyn HistoryStore>,
    pub compaction: CompactionSettings,
    /// Transcript entries replayed from events after the checkpoint.
    pub replayed_transcript: Vec<TranscriptEntry>,
    /// Active role after replay.
    pub active_role: String,
    /// Routing context after replay.
    pub routing_context: RoutingContext,
    /// Last event sequence seen in the log.
    pub last_event_seq: u64,
    /// History loaded from the external history store.
    pub history: Vec<ChatInteraction>,
    pub status_rx: mpsc::UnboundedReceiver<String>,
}

// ============================================================================
// Constants
// ============================================================================

/// Maximum events to batch before forcing a flush.
pub const BATCH_SIZE: usize = 10;

/// Interval at which pending log events are flushed to disk.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Number of flushed events between snapshots.
pub const SNAPSHOT_INTERVAL: u64 = 50;

/// Number of un-checkpointed transcript entries before the checkpoint
/// rolls forward.
pub const CHECKPOINT_THRESHOLD: usize = 50;

/// Channel capacity for commands.
///
/// If this fills up, callers block on send(), providing backpressure.
pub const CHANNEL_CAPACITY: usize = 256;
