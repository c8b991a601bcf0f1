//! Wire types shared between the HTTP surface and the session layer.

use serde::{Deserialize, Serialize};

use crate::session::ChatInteraction;

/// Prefix for generated session IDs.
pub const SESSION_ID_PREFIX: &str = "session_";

/// Maximum accepted length for a user message, in characters.
///
/// Longer input is rejected synchronously before it is queued.
pub const MAX_MESSAGE_CHARS: usize = 1000;

// ============================================================================
// Session Status
// ============================================================================

/// Dispatch-loop state of a session, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Queue is empty; waiting for events.
    Idle,
    /// Draining the pending-event queue.
    Draining,
    /// A compaction has been requested and will run at the next safe point.
    CompactionPending,
    /// Termination completed; no further events will be drained.
    Ended,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Draining => write!(f, "draining"),
            SessionStatus::CompactionPending => write!(f, "compaction_pending"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Optional client identifier seeded into the routing context.
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitStatusRequest {
    pub status: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub active_role: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub active_role: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetSessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub active_role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessMessageResponse {
    /// Interactions appended by the turn(s) this call produced.
    pub interactions: Vec<ChatInteraction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub interactions: Vec<ChatInteraction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}
