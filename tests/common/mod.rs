//! Common test utilities.
#![allow(dead_code)] // each test binary uses a different subset

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;

use steward::codec::ClaimCheckCodec;
use steward::gate::KeywordClassifier;
use steward::routing::{RoleGraph, RoutinePlanner};
use steward::server::{AppState, build_app};
use steward::session::{CompactionSettings, SessionRegistry, SessionServices};
use steward::store::file::{
    FileContentStore, FileHistoryStore, FileRecordStore, FileSessionStore,
};
use steward::tasks::{RetryPolicy, WorkerCommand};

/// Knobs for building a test registry.
pub struct TestOptions {
    pub compaction: CompactionSettings,
    pub codec_threshold: usize,
    pub worker_command: Option<WorkerCommand>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            // Keep automatic compaction out of the way unless a test
            // opts in.
            compaction: CompactionSettings {
                enabled: false,
                event_threshold: 200,
                archive: false,
            },
            codec_threshold: steward::codec::DEFAULT_THRESHOLD_BYTES,
            worker_command: None,
        }
    }
}

/// Fast retry policy so retry paths don't slow the suite down.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_interval: Duration::from_millis(5),
        backoff_coefficient: 2.0,
        max_interval: Duration::from_millis(20),
        max_elapsed: Duration::from_millis(500),
    }
}

/// Build a registry over the given workspace directory.
///
/// Reusable across restarts: building twice over the same workspace
/// exercises recovery.
pub async fn registry_at(workspace: &Path, options: &TestOptions) -> SessionRegistry {
    let content_store = Arc::new(FileContentStore::new(workspace.join("blobs")));
    let codec = ClaimCheckCodec::new(content_store, options.codec_threshold);

    let session_store = Arc::new(FileSessionStore::new(
        workspace.join("sessions"),
        codec.clone(),
    ));
    let history_store = Arc::new(FileHistoryStore::new(workspace.join("history"), codec));

    let records = FileRecordStore::new(workspace.join("records.json"));
    records.seed_demo_data().await.unwrap();

    SessionRegistry::new(SessionServices {
        session_store,
        history_store,
        records: Arc::new(records),
        gate: Arc::new(KeywordClassifier::new()),
        planner: Arc::new(RoutinePlanner::new()),
        graph: RoleGraph::advisory(),
        retry: fast_retry(),
        worker_command: options.worker_command.clone(),
        max_handoff_depth: 5,
        compaction: options.compaction.clone(),
    })
}

/// A fresh registry over a leaked temp workspace.
pub async fn test_registry() -> (SessionRegistry, PathBuf) {
    test_registry_with(TestOptions::default()).await
}

pub async fn test_registry_with(options: TestOptions) -> (SessionRegistry, PathBuf) {
    // Leak the TempDir so it survives for the whole test; the OS cleans
    // up on process exit.
    let tmp = Box::leak(Box::new(TempDir::new().unwrap()));
    let workspace = tmp.path().to_path_buf();
    let registry = registry_at(&workspace, &options).await;
    (registry, workspace)
}

/// A test router over a fresh registry.
pub async fn test_app() -> Router {
    let (registry, _workspace) = test_registry().await;
    build_app(
        AppState {
            registry,
            max_connections: 64,
        },
        300,
    )
}

/// Poll until `check` passes or the timeout elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F)
where
    F: AsyncFnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
