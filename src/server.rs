//! HTTP server assembly.

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::session::SessionRegistry;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub max_connections: usize,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let max_connections = state.max_connections;

    let api_routes = Router::new()
        .route(
            "/sessions",
            get(handlers::v1::list_sessions).post(handlers::v1::create_session),
        )
        .route(
            "/sessions/{session_id}",
            get(handlers::v1::get_session).delete(handlers::v1::delete_session),
        )
        .route(
            "/sessions/{session_id}/history",
            get(handlers::v1::get_history),
        )
        .route(
            "/sessions/{session_id}/messages",
            post(handlers::v1::process_message),
        )
        .route(
            "/sessions/{session_id}/notify",
            post(handlers::v1::notify_session),
        )
        .route(
            "/sessions/{session_id}/status",
            post(handlers::v1::submit_status),
        )
        .route(
            "/sessions/{session_id}/terminate",
            post(handlers::v1::terminate_session),
        )
        .route(
            "/sessions/{session_id}/compact",
            post(handlers::v1::compact_session),
        )
        .with_state(state.clone())
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)) // 2 MB
        .layer(ConcurrencyLimitLayer::new(max_connections));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .nest("/api/v1", api_routes)
}
