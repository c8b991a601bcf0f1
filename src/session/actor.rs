//! Per-session actor: the serialized event-dispatch loop.
//!
//! Each session gets a dedicated actor task that owns all mutable state
//! and serializes every mutation through message passing. Inbound events
//! go into a FIFO pending queue and drain one turn at a time; commands
//! arriving mid-drain are absorbed between turns, so no two turns ever
//! execute concurrently against the same session and queries never see a
//! partially applied turn.
//!
//! The dispatch loop moves through `Idle -> Draining -> (CompactionPending
//! | Idle)` with terminal state `Ended`. Compaction runs only between
//! turns: the actor checkpoints, compacts the log, and reseeds its entire
//! mutable state from the checkpoint record, the in-process equivalent of
//! restarting the host seeded from the checkpoint, carrying forward only
//! the pending queue and transcript.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::api::SessionStatus;
use crate::routing::RoutingContext;
use crate::store::{HistoryStore, SessionStore};

use super::actor_types::{
    ActorConfig, ActorError, BATCH_SIZE, CHANNEL_CAPACITY, CHECKPOINT_THRESHOLD, CompactionSettings,
    FLUSH_INTERVAL, RecoverConfig, SNAPSHOT_INTERVAL, SessionCommand, SessionMetadata,
};
use super::events::{PendingEvent, SessionEndReason, SessionEvent, SessionEventPayload};
use super::interaction::{ChatInteraction, TranscriptEntry};
use super::snapshot::SessionSnapshot;
use super::turn::{TurnEngine, TurnError};

/// A queued pending event, tagged for waiter matching.
struct QueuedEvent {
    id: u64,
    event: PendingEvent,
}

/// A synchronous caller waiting for its event's turn to complete.
struct TurnWaiter {
    event_id: u64,
    history_start: usize,
    reply: oneshot::Sender<Result<Vec<ChatInteraction>, ActorError>>,
}

// ============================================================================
// Session Actor
// ============================================================================

/// Per-session actor that owns state and drains pending events.
pub struct SessionActor {
    // Identity
    id: String,

    // Dispatch state
    status: SessionStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    terminating: bool,
    compaction_requested: bool,

    // Transcript (checkpoint-based split)
    /// Entries up to checkpoint_seq (stable, written to checkpoints).
    checkpointed_transcript: Vec<TranscriptEntry>,
    /// Entries after checkpoint_seq (reconstructed from events on recovery).
    pending_transcript: Vec<TranscriptEntry>,
    checkpoint_seq: u64,

    // Routing state
    active_role: String,
    routing_context: RoutingContext,

    // History (externally persisted; mirrored for queries)
    history: Vec<ChatInteraction>,

    // Pending-event queue
    queue: VecDeque<QueuedEvent>,
    next_event_id: u64,
    waiters: Vec<TurnWaiter>,

    // Event sequencing
    last_event_seq: u64,
    last_flushed_seq: u64,
    last_snapshot_seq: u64,
    unflushed: VecDeque<SessionEvent>,

    // Turn execution
    engine: TurnEngine,

    // Persistence
    store: Arc<dyn SessionStore>,
    history_store: Arc<dyn HistoryStore>,
    compaction: CompactionSettings,

    // Communication
    command_rx: mpsc::Receiver<SessionCommand>,
    status_rx: mpsc::UnboundedReceiver<String>,
    status_open: bool,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionActor {
    /// Spawn a new session actor for a fresh session.
    ///
    /// The actor writes a SessionStart event and initial checkpoint before
    /// processing commands; the registry verifies durability through
    /// `ForceSnapshot`.
    pub fn spawn(
        config: ActorConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (mpsc::Sender<SessionCommand>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let now = Utc::now();
        let entry_role = config.engine.entry_role().to_string();

        let actor = Self {
            id: config.id,
            status: SessionStatus::Idle,
            created_at: now,
            updated_at: now,
            terminating: false,
            compaction_requested: false,
            checkpointed_transcript: Vec::new(),
            pending_transcript: Vec::new(),
            checkpoint_seq: 0,
            active_role: entry_role,
            routing_context: config.initial_context,
            history: Vec::new(),
            queue: VecDeque::new(),
            next_event_id: 0,
            waiters: Vec::new(),
            last_event_seq: 0,
            last_flushed_seq: 0,
            last_snapshot_seq: 0,
            unflushed: VecDeque::new(),
            engine: config.engine,
            store: config.store,
            history_store: config.history_store,
            compaction: config.compaction,
            command_rx: rx,
            status_rx: config.status_rx,
            status_open: true,
            shutdown_rx,
        };

        let handle = tokio::spawn(actor.run(true));
        (tx, handle)
    }

    /// Spawn an actor recovered from a checkpoint plus replayed events.
    pub fn spawn_recovered(
        config: RecoverConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (mpsc::Sender<SessionCommand>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let snapshot = config.snapshot;

        // Carried-over pending events are requeued first.
        let mut queue = VecDeque::new();
        let mut next_event_id = 0;
        for event in snapshot.pending_events {
            queue.push_back(QueuedEvent {
                id: next_event_id,
                event,
            });
            next_event_id += 1;
        }

        let actor = Self {
            id: snapshot.session_id,
            status: snapshot.status,
            created_at: snapshot.created_at,
            updated_at: snapshot.snapshot_at,
            terminating: snapshot.terminating,
            compaction_requested: false,
            checkpointed_transcript: snapshot.transcript,
            pending_transcript: config.replayed_transcript,
            checkpoint_seq: snapshot.checkpoint_seq,
            active_role: config.active_role,
            routing_context: config.routing_context,
            history: config.history,
            queue,
            next_event_id,
            waiters: Vec::new(),
            last_event_seq: config.last_event_seq,
            last_flushed_seq: config.last_event_seq,
            last_snapshot_seq: config.last_event_seq,
            unflushed: VecDeque::new(),
            engine: config.engine,
            store: config.store,
            history_store: config.history_store,
            compaction: config.compaction,
            command_rx: rx,
            status_rx: config.status_rx,
            status_open: true,
            shutdown_rx,
        };

        let handle = tokio::spawn(actor.run(false));
        (tx, handle)
    }

    async fn run(mut self, fresh: bool) {
        debug!(session_id = %self.id, fresh, "Session actor started");

        if fresh {
            // Write SessionStart and an initial checkpoint (crash safety).
            // If this fails, events stay queued and the next flush retries.
            let seq = self.next_seq();
            self.unflushed.push_back(SessionEvent::new(
                seq,
                SessionEventPayload::SessionStart {
                    entry_role: self.active_role.clone(),
                },
            ));
            if let Err(e) = self.flush_and_snapshot().await {
                warn!(session_id = %self.id, error = %e, "Initial flush failed, queued for retry");
            }
        }

        self.command_loop().await;
        debug!(session_id = %self.id, "Session actor stopped");
    }

    // ------------------------------------------------------------------------
    // Dispatch Loop
    // ------------------------------------------------------------------------

    async fn command_loop(&mut self) {
        let mut flush_timer = interval_at(Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);

        loop {
            // Drain whatever is queued before blocking for new input.
            self.drain_queue().await;

            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        debug!(session_id = %self.id, "Session actor received shutdown signal");
                        self.absorb_ready_inputs().await;
                        self.drain_queue().await;
                        let _ = self.flush_and_snapshot().await;
                        break;
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            self.handle_command(command).await;
                            if self.unflushed.len() >= BATCH_SIZE {
                                let _ = self.flush_events().await;
                            }
                        }
                        None => {
                            // All handles dropped.
                            debug!(session_id = %self.id, "All handles dropped, shutting down");
                            let _ = self.flush_and_snapshot().await;
                            break;
                        }
                    }
                }

                status = self.status_rx.recv(), if self.status_open => {
                    match status {
                        Some(line) => {
                            self.enqueue(PendingEvent::ExternalStatus { content: line });
                        }
                        None => self.status_open = false,
                    }
                }

                _ = flush_timer.tick() => {
                    if !self.unflushed.is_empty() {
                        let _ = self.flush_events().await;
                    }
                }
            }
        }
    }

    /// Drain the pending queue, one turn at a time.
    ///
    /// Commands and status lines that arrive while draining are absorbed
    /// between turns, preserving submission order.
    async fn drain_queue(&mut self) {
        if self.status == SessionStatus::Ended {
            return;
        }

        loop {
            self.absorb_ready_inputs().await;

            let Some(queued) = self.queue.pop_front() else {
                break;
            };

            self.status = SessionStatus::Draining;
            self.run_one_turn(queued).await;
            self.maybe_compact().await;

            if self.status == SessionStatus::Ended {
                return;
            }
        }

        // Host-signal compaction also runs at idle.
        self.maybe_compact().await;

        if self.terminating {
            self.finish_session().await;
        } else if self.status != SessionStatus::Ended {
            self.status = SessionStatus::Idle;
        }
    }

    /// Absorb all commands and status lines already waiting.
    async fn absorb_ready_inputs(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.handle_command(cmd).await;
        }
        while let Ok(line) = self.status_rx.try_recv() {
            self.enqueue(PendingEvent::ExternalStatus { content: line });
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SubmitUserMessage { content, reply } => {
                // Accepted even after termination; it just never drains.
                self.enqueue(PendingEvent::UserMessage { content });
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SubmitExternalStatus { content, reply } => {
                self.enqueue(PendingEvent::ExternalStatus { content });
                let _ = reply.send(Ok(()));
            }
            SessionCommand::ProcessMessage { content, reply } => {
                if self.status == SessionStatus::Ended {
                    let _ = reply.send(Err(ActorError::SessionEnded));
                    return;
                }
                let event_id = self.enqueue(PendingEvent::UserMessage { content });
                self.waiters.push(TurnWaiter {
                    event_id,
                    history_start: self.history.len(),
                    reply,
                });
            }
            SessionCommand::Terminate { reply } => {
                self.terminating = true;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::RequestCompaction { reply } => {
                if self.status != SessionStatus::Ended {
                    self.compaction_requested = true;
                    if self.status == SessionStatus::Idle {
                        self.status = SessionStatus::CompactionPending;
                    }
                }
                let _ = reply.send(Ok(()));
            }
            SessionCommand::GetHistory { reply } => {
                let _ = reply.send(Ok(self.history.clone()));
            }
            SessionCommand::GetMetadata { reply } => {
                let metadata = SessionMetadata {
                    id: self.id.clone(),
                    status: self.status,
                    active_role: self.active_role.clone(),
                    created_at: self.created_at,
                    updated_at: self.updated_at,
                    last_event_seq: self.last_event_seq,
                    queued_events: self.queue.len(),
                };
                let _ = reply.send(Ok(metadata));
            }
            SessionCommand::ForceFlush { reply } => {
                let result = self.flush_events().await;
                let _ = reply.send(result);
            }
            SessionCommand::ForceSnapshot { reply } => {
                let result = self.flush_and_snapshot().await;
                let _ = reply.send(result);
            }
        }
    }

    /// Enqueue a pending event, returning its id.
    fn enqueue(&mut self, event: PendingEvent) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.queue.push_back(QueuedEvent { id, event });
        id
    }

    // ------------------------------------------------------------------------
    // Turn Execution
    // ------------------------------------------------------------------------

    /// Process exactly one pending event.
    ///
    /// At-most-once: a failed turn is never re-queued; the failure is
    /// recorded in history and surfaced to any synchronous waiter.
    async fn run_one_turn(&mut self, queued: QueuedEvent) {
        self.updated_at = Utc::now();

        match queued.event {
            PendingEvent::ExternalStatus { content } => {
                // Trusted internal coordination: bypasses gate and routing.
                let seq = self.next_seq();
                self.unflushed.push_back(SessionEvent::new(
                    seq,
                    SessionEventPayload::ExternalStatus {
                        content: content.clone(),
                    },
                ));
                self.commit_interaction(queued.id, ChatInteraction::status(content))
                    .await;
            }

            PendingEvent::UserMessage { content } => {
                let transcript = self.full_transcript();
                let outcome = self
                    .engine
                    .run_turn(&self.active_role, &self.routing_context, &transcript, &content)
                    .await;

                match outcome {
                    Ok(record) => {
                        for payload in record.events {
                            let seq = self.next_seq();
                            self.unflushed.push_back(SessionEvent::new(seq, payload));
                        }
                        self.active_role = record.active_role;
                        self.routing_context = record.context;
                        self.pending_transcript.extend(record.transcript_entries);
                        self.maybe_roll_checkpoint();
                        self.commit_interaction(queued.id, record.interaction).await;
                    }
                    Err(e) => {
                        warn!(session_id = %self.id, error = %e, "Turn aborted");
                        let seq = self.next_seq();
                        self.unflushed.push_back(SessionEvent::new(
                            seq,
                            SessionEventPayload::Error {
                                code: e.code().to_string(),
                                message: e.to_string(),
                            },
                        ));
                        self.commit_failed_turn(queued.id, &content, &e).await;
                    }
                }
            }
        }

        let _ = self.flush_events().await;
    }

    /// Append an interaction to history and satisfy waiters for the event.
    async fn commit_interaction(&mut self, event_id: u64, interaction: ChatInteraction) {
        // The external history store is the durable record; it is written
        // before the in-memory mirror grows.
        if let Err(e) = self.history_store.append(&self.id, &interaction).await {
            warn!(session_id = %self.id, error = %e, "Failed to persist interaction");
        }
        self.history.push(interaction);

        for waiter in self.take_waiters(event_id) {
            let start = waiter.history_start.min(self.history.len());
            let _ = waiter.reply.send(Ok(self.history[start..].to_vec()));
        }
    }

    /// Record a failed turn: error-trace interaction, error to waiters.
    async fn commit_failed_turn(&mut self, event_id: u64, content: &str, error: &TurnError) {
        let interaction = ChatInteraction::failed(content, error);
        if let Err(e) = self.history_store.append(&self.id, &interaction).await {
            warn!(session_id = %self.id, error = %e, "Failed to persist interaction");
        }
        self.history.push(interaction);

        for waiter in self.take_waiters(event_id) {
            let _ = waiter.reply.send(Err(ActorError::Turn(error.to_string())));
        }
    }

    /// Remove and return the waiters registered for an event.
    fn take_waiters(&mut self, event_id: u64) -> Vec<TurnWaiter> {
        let (taken, kept): (Vec<_>, Vec<_>) = self
            .waiters
            .drain(..)
            .partition(|waiter| waiter.event_id == event_id);
        self.waiters = kept;
        taken
    }

    /// Transition to the terminal state once the queue has drained.
    async fn finish_session(&mut self) {
        if self.status == SessionStatus::Ended {
            return;
        }

        info!(session_id = %self.id, "Session ended");
        self.status = SessionStatus::Ended;
        self.updated_at = Utc::now();

        let seq = self.next_seq();
        self.unflushed.push_back(SessionEvent::new(
            seq,
            SessionEventPayload::SessionEnd {
                reason: SessionEndReason::Terminated,
            },
        ));
        let _ = self.flush_and_snapshot().await;
    }

    // ------------------------------------------------------------------------
    // Transcript Helpers
    // ------------------------------------------------------------------------

    fn full_transcript(&self) -> Vec<TranscriptEntry> {
        let mut all = self.checkpointed_transcript.clone();
        all.extend(self.pending_transcript.clone());
        all
    }

    /// Roll the checkpoint forward if the pending transcript grew large.
    fn maybe_roll_checkpoint(&mut self) {
        if self.pending_transcript.len() >= CHECKPOINT_THRESHOLD {
            self.checkpointed_transcript
                .append(&mut self.pending_transcript);
            self.checkpoint_seq = self.last_event_seq;
        }
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    fn next_seq(&mut self) -> u64 {
        self.last_event_seq += 1;
        self.last_event_seq
    }

    /// Flush unflushed events to the store.
    async fn flush_events(&mut self) -> Result<(), ActorError> {
        if self.unflushed.is_empty() {
            return Ok(());
        }

        let events: Vec<SessionEvent> = self.unflushed.drain(..).collect();
        let last_seq = events.last().map(|e| e.seq).unwrap_or(self.last_flushed_seq);

        if let Err(e) = self.store.append_events(&self.id, &events).await {
            warn!(session_id = %self.id, error = %e, "Failed to flush events");
            // Re-queue on failure; the periodic timer retries.
            for event in events.into_iter().rev() {
                self.unflushed.push_front(event);
            }
            return Err(ActorError::Persistence(e.to_string()));
        }

        self.last_flushed_seq = last_seq;

        if self.last_flushed_seq - self.last_snapshot_seq >= SNAPSHOT_INTERVAL {
            self.write_snapshot().await?;
        }

        Ok(())
    }

    /// Build the checkpoint record for the current state.
    fn snapshot_record(&self) -> SessionSnapshot {
        SessionSnapshot {
            schema_version: SessionSnapshot::SCHEMA_VERSION.to_string(),
            session_id: self.id.clone(),
            status: if self.status == SessionStatus::Ended {
                SessionStatus::Ended
            } else {
                SessionStatus::Idle
            },
            created_at: self.created_at,
            snapshot_at: Utc::now(),
            last_event_seq: self.last_flushed_seq,
            checkpoint_seq: self.checkpoint_seq,
            transcript: self.checkpointed_transcript.clone(),
            active_role: self.active_role.clone(),
            routing_context: self.routing_context.clone(),
            terminating: self.terminating,
            pending_events: self.queue.iter().map(|q| q.event.clone()).collect(),
        }
    }

    async fn write_snapshot(&mut self) -> Result<(), ActorError> {
        let snapshot = self.snapshot_record();
        self.store
            .save_snapshot(&self.id, &snapshot)
            .await
            .map_err(|e| {
                warn!(session_id = %self.id, error = %e, "Failed to write snapshot");
                ActorError::Persistence(e.to_string())
            })?;

        self.last_snapshot_seq = self.last_flushed_seq;
        Ok(())
    }

    async fn flush_and_snapshot(&mut self) -> Result<(), ActorError> {
        self.flush_events().await?;
        self.write_snapshot().await
    }

    // ------------------------------------------------------------------------
    // Compaction
    // ------------------------------------------------------------------------

    /// Compact if a trigger fired. Runs only between turns.
    async fn maybe_compact(&mut self) {
        let log_grown = self.compaction.enabled
            && self.last_flushed_seq.saturating_sub(self.checkpoint_seq)
                >= self.compaction.event_threshold;

        if !(self.compaction_requested || log_grown) || self.status == SessionStatus::Ended {
            return;
        }
        self.compaction_requested = false;

        if let Err(e) = self.compact().await {
            // A failed checkpoint aborts only this attempt; the session
            // keeps operating on its existing log.
            warn!(session_id = %self.id, error = %e, "Compaction attempt failed");
        }
    }

    /// Checkpoint, compact the log, and reseed from the checkpoint.
    async fn compact(&mut self) -> Result<(), ActorError> {
        self.flush_events().await?;

        // Everything flushed is stable now; roll it into the checkpoint.
        self.checkpointed_transcript
            .append(&mut self.pending_transcript);
        self.checkpoint_seq = self.last_flushed_seq;

        let snapshot = self.snapshot_record();
        self.store
            .save_snapshot(&self.id, &snapshot)
            .await
            .map_err(|e| ActorError::Persistence(e.to_string()))?;
        self.last_snapshot_seq = self.last_flushed_seq;

        self.store
            .compact_events(&self.id, self.checkpoint_seq, self.compaction.archive)
            .await
            .map_err(|e| ActorError::Persistence(e.to_string()))?;

        // Restart-with-carryover: rebuild all mutable state from the
        // checkpoint record alone. The live queue and its waiters ARE the
        // carried-forward pending events, so they stay.
        self.reseed_from_snapshot(snapshot).await;

        let seq = self.next_seq();
        self.unflushed.push_back(SessionEvent::new(
            seq,
            SessionEventPayload::Compacted {
                up_to_seq: self.checkpoint_seq,
            },
        ));
        let _ = self.flush_events().await;

        info!(
            session_id = %self.id,
            checkpoint_seq = self.checkpoint_seq,
            "Compacted session log and reseeded from checkpoint"
        );
        Ok(())
    }

    /// Reconstruct mutable state purely from a checkpoint record.
    ///
    /// History is reloaded from the external store: it survives because
    /// it was persisted there, not because it survives in memory.
    async fn reseed_from_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.checkpointed_transcript = snapshot.transcript;
        self.pending_transcript = Vec::new();
        self.checkpoint_seq = snapshot.checkpoint_seq;
        self.last_event_seq = snapshot.last_event_seq;
        self.last_flushed_seq = snapshot.last_event_seq;
        self.last_snapshot_seq = snapshot.last_event_seq;
        self.active_role = snapshot.active_role;
        self.routing_context = snapshot.routing_context;
        self.terminating = snapshot.terminating;

        match self.history_store.load(&self.id).await {
            Ok(history) => self.history = history,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "History reload failed; keeping mirror");
            }
        }
    }
}
