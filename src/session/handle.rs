//! Session handle for communicating with a session actor.
//!
//! `SessionHandle` is a thin wrapper around an `mpsc::Sender<SessionCommand>`.
//! It provides async methods for all session operations and is cheap to
//! clone. Input validation for the synchronous path happens here, before
//! anything is queued.

use tokio::sync::{mpsc, oneshot};

use crate::api::MAX_MESSAGE_CHARS;

use super::actor_types::{ActorError, SessionCommand, SessionMetadata};
use super::interaction::ChatInteraction;

/// Handle for interacting with a session actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    id: String,
}

impl SessionHandle {
    /// Create a new handle from a command sender.
    pub(crate) fn new(tx: mpsc::Sender<SessionCommand>, id: String) -> Self {
        Self { tx, id }
    }

    /// Get the session ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Submit a user message, fire-and-forget.
    ///
    /// Returns once the event is enqueued; the turn runs asynchronously.
    pub async fn submit_user_message(&self, content: String) -> Result<(), ActorError> {
        validate_message(&content)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::SubmitUserMessage {
                content,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    /// Submit an external status event, fire-and-forget.
    pub async fn submit_external_status(&self, content: String) -> Result<(), ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::SubmitExternalStatus {
                content,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    /// Process a user message synchronously.
    ///
    /// Validates the input before it is queued, then blocks until the
    /// event's turn completes and returns the interactions it appended.
    pub async fn process_message(
        &self,
        content: String,
    ) -> Result<Vec<ChatInteraction>, ActorError> {
        validate_message(&content)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::ProcessMessage {
                content,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    /// Request cooperative termination.
    ///
    /// Already-queued events continue to drain before the session ends.
    pub async fn terminate(&self) -> Result<(), ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Terminate { reply: reply_tx })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    /// Signal that the session's log should be compacted.
    pub async fn request_compaction(&self) -> Result<(), ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::RequestCompaction { reply: reply_tx })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Get the full ordered interaction history.
    pub async fn history(&self) -> Result<Vec<ChatInteraction>, ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::GetHistory { reply: reply_tx })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    /// Get session metadata.
    pub async fn metadata(&self) -> Result<SessionMetadata, ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::GetMetadata { reply: reply_tx })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    // ------------------------------------------------------------------------
    // Flush / Snapshot
    // ------------------------------------------------------------------------

    /// Force an immediate flush of pending log events.
    pub async fn force_flush(&self) -> Result<(), ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::ForceFlush { reply: reply_tx })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }

    /// Force an immediate flush and checkpoint write.
    pub async fn force_snapshot(&self) -> Result<(), ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::ForceSnapshot { reply: reply_tx })
            .await
            .map_err(|_| ActorError::ActorShutdown)?;

        reply_rx.await.map_err(|_| ActorError::ActorShutdown)?
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// Reject empty or oversized input before it reaches the queue.
fn validate_message(content: &str) -> Result<(), ActorError> {
    if content.trim().is_empty() {
        return Err(ActorError::Validation("message is empty".to_string()));
    }
    let chars = content.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ActorError::Validation(format!(
            "message is {chars} characters, maximum is {MAX_MESSAGE_CHARS}"
        )));
    }
    Ok(())
}
