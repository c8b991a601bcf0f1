//! Session registry for managing actor lifecycles.
//!
//! The registry is responsible for:
//! - Creating new session actors (with per-session engine construction)
//! - Looking up existing sessions
//! - Recovering sessions from disk on startup
//! - Graceful shutdown of all actors

use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::api::{SESSION_ID_PREFIX, SessionStatus};
use crate::gate::AdmissionClassifier;
use crate::process::ProcessCoordinator;
use crate::routing::{RoleGraph, RolePlanner, RoutingContext};
use crate::store::{HistoryStore, RecordStore, SessionStore};
use crate::tasks::{Invoker, RetryPolicy, TaskDependencies, TaskExecutor, WorkerCommand};

use super::actor::SessionActor;
use super::actor_types::{
    ActorConfig, ActorError, CompactionSettings, RecoverConfig, SessionMetadata,
};
use super::events::SessionEventPayload;
use super::handle::SessionHandle;
use super::turn::TurnEngine;

// ============================================================================
// Per-Session Services
// ============================================================================

/// Everything needed to construct a session's engine and stores.
///
/// The gate, planner, and graph are shared immutable configuration; the
/// executor and process coordinator are built fresh for every session so
/// no mutable state crosses session boundaries.
pub struct SessionServices {
    pub session_store: Arc<dyn SessionStore>,
    pub history_store: Arc<dyn HistoryStore>,
    pub records: Arc<dyn RecordStore>,
    pub gate: Arc<dyn AdmissionClassifier>,
    pub planner: Arc<dyn RolePlanner>,
    pub graph: RoleGraph,
    pub retry: RetryPolicy,
    pub worker_command: Option<WorkerCommand>,
    pub max_handoff_depth: u32,
    pub compaction: CompactionSettings,
}

impl SessionServices {
    /// Build a fresh turn engine and its status-sink receiver.
    fn build_engine(&self) -> (TurnEngine, mpsc::UnboundedReceiver<String>) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(ProcessCoordinator::new(status_tx));

        let executor = TaskExecutor::advisory(
            Invoker::new(self.retry.clone()),
            TaskDependencies {
                records: Arc::clone(&self.records),
                coordinator,
                worker_command: self.worker_command.clone(),
            },
        );

        let engine = TurnEngine::new(
            Arc::clone(&self.gate),
            Arc::clone(&self.planner),
            self.graph.clone(),
            executor,
            self.max_handoff_depth,
        );

        (engine, status_rx)
    }
}

// ============================================================================
// Session Registry
// ============================================================================

/// Result of session recovery on startup.
#[derive(Debug, Default)]
pub struct RecoveryResult {
    /// Number of sessions successfully recovered.
    pub recovered: usize,
    /// Number of sessions skipped (ended or no checkpoint).
    pub skipped: usize,
    /// Errors encountered during recovery (session_id, error message).
    pub errors: Vec<(String, String)>,
}

/// Maximum concurrent metadata fetches for `list()`.
const LIST_CONCURRENCY: usize = 32;

/// Registry for session actors.
///
/// Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    handles: Arc<DashMap<String, SessionHandle>>,
    task_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    services: Arc<SessionServices>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionRegistry {
    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Create a new session registry.
    pub fn new(services: SessionServices) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            handles: Arc::new(DashMap::new()),
            task_handles: Arc::new(Mutex::new(Vec::new())),
            services: Arc::new(services),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Gracefully shut down all session actors.
    ///
    /// Actors drain queued commands, flush, and snapshot before stopping.
    pub async fn shutdown(&self) {
        info!("Shutting down session registry");

        if self.shutdown_tx.send(true).is_err() {
            warn!("Failed to send shutdown signal");
            return;
        }

        let task_handles = {
            let mut handles = self.task_handles.lock().await;
            std::mem::take(&mut *handles)
        };

        for task_handle in task_handles {
            if let Err(e) = task_handle.await {
                warn!(error = ?e, "Actor task panicked during shutdown");
            }
        }

        info!("Session registry shutdown complete");
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Create a new session.
    ///
    /// Spawns an actor, waits for the initial checkpoint to be durable,
    /// and rolls back if persistence fails.
    pub async fn create(&self, initial_context: RoutingContext) -> Result<SessionHandle, ActorError> {
        let id = format!("{}{}", SESSION_ID_PREFIX, Ulid::new());
        let (engine, status_rx) = self.services.build_engine();

        let config = ActorConfig {
            id: id.clone(),
            engine,
            store: Arc::clone(&self.services.session_store),
            history_store: Arc::clone(&self.services.history_store),
            compaction: self.services.compaction.clone(),
            initial_context,
            status_rx,
        };

        let (tx, task_handle) = SessionActor::spawn(config, self.shutdown_rx.clone());
        let handle = SessionHandle::new(tx, id.clone());

        // Insert first: the session is visible for concurrent lookups as
        // soon as the actor can accept commands.
        let _ = self.handles.insert(id.clone(), handle.clone());

        // Wait for SessionStart + initial checkpoint (crash safety).
        if let Err(e) = handle.force_snapshot().await {
            warn!(
                session_id = %id,
                error = %e,
                "Failed to persist session initialization, rolling back"
            );
            let _ = self.handles.remove(&id);
            drop(handle);
            task_handle.abort();
            return Err(e);
        }

        let mut guard = self.task_handles.lock().await;
        guard.retain(|h| !h.is_finished());
        guard.push(task_handle);

        Ok(handle)
    }

    /// Get a session handle by ID.
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.handles.get(id).map(|r| r.clone())
    }

    /// Check if a session exists.
    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    /// List metadata for all live sessions, fetched in parallel.
    pub async fn list(&self) -> Vec<SessionMetadata> {
        let handles: Vec<_> = self
            .handles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        stream::iter(handles)
            .map(|handle| async move { handle.metadata().await })
            .buffer_unordered(LIST_CONCURRENCY)
            .filter_map(|result| async move { result.ok() })
            .collect()
            .await
    }

    /// Remove a session handle from the registry.
    ///
    /// Returns true if a session was removed. When all handle clones drop,
    /// the actor shuts down naturally.
    pub fn remove(&self, id: &str) -> bool {
        self.handles.remove(id).is_some()
    }

    /// The session store backing this registry.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.services.session_store
    }

    /// The history store backing this registry.
    pub fn history_store(&self) -> &Arc<dyn HistoryStore> {
        &self.services.history_store
    }

    /// The number of live sessions.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the registry has no live sessions.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    // ------------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------------

    /// Recover sessions from disk on startup.
    pub async fn recover(&self) -> Result<RecoveryResult, ActorError> {
        let mut result = RecoveryResult::default();

        let session_ids = self
            .services
            .session_store
            .list()
            .await
            .map_err(|e| ActorError::Persistence(format!("failed to list sessions: {e}")))?;

        if session_ids.is_empty() {
            debug!("No sessions to recover");
            return Ok(result);
        }

        for session_id in session_ids {
            match self.recover_single_session(&session_id).await {
                Ok(true) => result.recovered += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to recover session");
                    result.errors.push((session_id, e.to_string()));
                }
            }
        }

        info!(
            recovered = result.recovered,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Session recovery complete"
        );

        Ok(result)
    }

    /// Recover a single session from its checkpoint plus event replay.
    ///
    /// Replay re-derives state from previously recorded results; it never
    /// re-executes a capability task.
    async fn recover_single_session(&self, session_id: &str) -> Result<bool, ActorError> {
        let snapshot = match self.services.session_store.load_snapshot(session_id).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                debug!(session_id = %session_id, "No checkpoint found, skipping");
                return Ok(false);
            }
            Err(e) => {
                return Err(ActorError::Persistence(format!(
                    "failed to load checkpoint: {e}"
                )));
            }
        };

        if snapshot.status == SessionStatus::Ended {
            debug!(session_id = %session_id, "Skipping ended session");
            return Ok(false);
        }

        // Replay events after the checkpoint.
        let events = self
            .services
            .session_store
            .load_events(session_id, snapshot.replay_from_seq())
            .await
            .map_err(|e| ActorError::Persistence(format!("failed to load events: {e}")))?;

        let mut replayed_transcript = Vec::new();
        let mut active_role = snapshot.active_role.clone();
        let mut routing_context = snapshot.routing_context.clone();
        let mut last_seq = snapshot.last_event_seq;
        let mut ended = false;

        for event in events {
            last_seq = last_seq.max(event.seq);

            if let Some(entry) = event.to_transcript_entry() {
                replayed_transcript.push(entry);
            }
            match event.payload {
                SessionEventPayload::RoleChange { to, .. } => active_role = to,
                SessionEventPayload::ContextUpdated { key, value } => {
                    routing_context.set(key, value);
                }
                SessionEventPayload::SessionEnd { .. } => ended = true,
                _ => {}
            }
        }

        if ended {
            debug!(session_id = %session_id, "Log ends with session end, skipping");
            return Ok(false);
        }

        // History is served from the external store from the first query.
        let history = self
            .services
            .history_store
            .load(session_id)
            .await
            .map_err(|e| ActorError::Persistence(format!("failed to load history: {e}")))?;

        let (engine, status_rx) = self.services.build_engine();
        let config = RecoverConfig {
            snapshot,
            engine,
            store: Arc::clone(&self.services.session_store),
            history_store: Arc::clone(&self.services.history_store),
            compaction: self.services.compaction.clone(),
            replayed_transcript,
            active_role,
            routing_context,
            last_event_seq: last_seq,
            history,
            status_rx,
        };

        let session_id = session_id.to_string();
        let (tx, task_handle) = SessionActor::spawn_recovered(config, self.shutdown_rx.clone());
        let handle = SessionHandle::new(tx, session_id.clone());

        let mut guard = self.task_handles.lock().await;
        guard.retain(|h| !h.is_finished());
        guard.push(task_handle);
        drop(guard);

        let _ = self.handles.insert(session_id.clone(), handle);
        info!(session_id = %session_id, "Recovered session");

        Ok(true)
    }
}
