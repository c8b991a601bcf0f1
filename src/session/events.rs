//! Session event types for the durable replay log.
//!
//! Events are appended to a JSONL file for crash-safe persistence. Each
//! event has a monotonic sequence number for replay ordering. Task events
//! double as the effects journal: `TaskCompleted` records the invocation
//! result, so recovery re-derives state from the log and never re-executes
//! a capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::interaction::TranscriptEntry;

/// A pending event awaiting dispatch.
///
/// Inserted into the session's FIFO queue, consumed in strict insertion
/// order, at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingEvent {
    /// End-user input; passes the admission gate before routing.
    UserMessage { content: String },
    /// Status text from trusted internal coordination; bypasses the gate.
    ExternalStatus { content: String },
}

impl PendingEvent {
    /// The raw text carried by the event.
    pub fn content(&self) -> &str {
        match self {
            PendingEvent::UserMessage { content } | PendingEvent::ExternalStatus { content } => {
                content
            }
        }
    }
}

/// A session event that can be persisted to the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Monotonic sequence number for ordering.
    pub seq: u64,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    #[serde(flatten)]
    pub payload: SessionEventPayload,
}

/// The payload of a session event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventPayload {
    /// Session was created.
    SessionStart { entry_role: String },
    /// Session reached its terminal state.
    SessionEnd { reason: SessionEndReason },
    /// User input accepted by the admission gate.
    UserMessage { content: String },
    /// User input rejected by the admission gate.
    ///
    /// The reason is internal; it appears in the trace, never in the
    /// response shown to the user.
    GateRejected { content: String, reason: String },
    /// Status text received from a coordinated sub-process.
    ExternalStatus { content: String },
    /// The active role pointer moved (handoff).
    RoleChange { from: String, to: String },
    /// A capability task was invoked.
    TaskInvoked {
        call_id: String,
        capability: String,
        arguments: serde_json::Value,
    },
    /// A capability task completed; `output` is the effects-journal record.
    TaskCompleted {
        call_id: String,
        success: bool,
        output: serde_json::Value,
    },
    /// A routing-context key changed (from a capability output).
    ContextUpdated { key: String, value: String },
    /// A turn finished with the given role producing the response text.
    TurnCompleted { role: String, response: String },
    /// The log was compacted; state was reseeded from the checkpoint.
    Compacted { up_to_seq: u64 },
    /// A turn-level error occurred (the session remains live).
    Error { code: String, message: String },
}

/// Reason for session end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Termination was requested and the queue drained.
    Terminated,
}

impl SessionEvent {
    /// Create a new event with the given sequence number and payload.
    #[must_use]
    pub fn new(seq: u64, payload: SessionEventPayload) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Convert this event to a transcript entry, if it contributes to the
    /// accepted-message transcript.
    pub fn to_transcript_entry(&self) -> Option<TranscriptEntry> {
        match &self.payload {
            SessionEventPayload::UserMessage { content } => Some(TranscriptEntry::user(content)),
            SessionEventPayload::TurnCompleted { role, response } if !response.is_empty() => {
                Some(TranscriptEntry::from_role(role, response))
            }
            _ => None,
        }
    }
}
