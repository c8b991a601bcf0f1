//! The `serve` command: run the HTTP server and session runtime.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::codec::ClaimCheckCodec;
use crate::config::{Config, GateMode};
use crate::gate::{AdmissionClassifier, HttpClassifier, KeywordClassifier};
use crate::routing::{RoleGraph, RoutinePlanner};
use crate::server::{AppState, build_app};
use crate::session::{SessionRegistry, SessionServices};
use crate::store::file::{FileContentStore, FileHistoryStore, FileRecordStore, FileSessionStore};

/// Run the server until interrupted.
pub async fn run(config_path: &str, host: Option<IpAddr>, port: Option<u16>) -> Result<()> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("loading config from {config_path}"))?;

    let registry = build_registry(&config, Path::new(config_path)).await?;

    let recovery = registry.recover().await.context("recovering sessions")?;
    if recovery.recovered > 0 {
        info!(recovered = recovery.recovered, "Recovered sessions from disk");
    }

    let state = AppState {
        registry: registry.clone(),
        max_connections: config.server.max_connections,
    };
    let app = build_app(state, config.server.request_timeout_seconds);

    let host = host.unwrap_or(config.server.host.parse()?);
    let port = port.unwrap_or(config.server.port);
    let addr = std::net::SocketAddr::new(host, port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "steward listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    registry.shutdown().await;
    Ok(())
}

/// Assemble the session registry from configuration.
async fn build_registry(config: &Config, config_path: &Path) -> Result<SessionRegistry> {
    let workspace = config.workspace_dir(config_path);

    let content_store = Arc::new(FileContentStore::new(workspace.join("blobs")));
    let codec = ClaimCheckCodec::new(content_store, config.codec.threshold_bytes);

    let session_store = Arc::new(FileSessionStore::new(
        workspace.join("sessions"),
        codec.clone(),
    ));
    let history_store = Arc::new(FileHistoryStore::new(workspace.join("history"), codec));

    let records_path = config
        .records
        .path
        .clone()
        .unwrap_or_else(|| workspace.join("records.json"));
    let records = FileRecordStore::new(records_path);
    if config.records.seed_demo {
        records.seed_demo_data().await.context("seeding records")?;
    }

    let gate: Arc<dyn AdmissionClassifier> = match config.gate.mode {
        GateMode::Keyword => Arc::new(KeywordClassifier::new()),
        GateMode::Http => Arc::new(HttpClassifier::new(config.gate.endpoint.clone())),
    };

    let services = SessionServices {
        session_store,
        history_store,
        records: Arc::new(records),
        gate,
        planner: Arc::new(RoutinePlanner::new()),
        graph: RoleGraph::advisory(),
        retry: config.retry.to_policy(),
        worker_command: config.account_worker.as_ref().map(|w| w.to_command()),
        max_handoff_depth: config.routing.max_handoff_depth,
        compaction: config.compaction.to_settings(),
    };

    Ok(SessionRegistry::new(services))
}
