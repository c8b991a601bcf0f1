//! Session HTTP handlers.

use axum::Json;
use axum::extract::{Path as PathExtract, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::api::{
    AcceptedResponse, CreateSessionRequest, CreateSessionResponse, GetSessionResponse,
    HistoryResponse, ListSessionsResponse, ProcessMessageRequest, ProcessMessageResponse,
    SessionSummary, SubmitStatusRequest,
};
use crate::handlers::problem_details;
use crate::routing::RoutingContext;
use crate::server::AppState;
use crate::session::ActorError;

/// Map an actor error onto a problem-details response.
fn actor_error_response(e: ActorError) -> Response {
    match e {
        ActorError::Validation(detail) => problem_details::validation_error(detail).into_response(),
        ActorError::SessionEnded => {
            problem_details::conflict("session has ended").into_response()
        }
        ActorError::Turn(detail) => {
            problem_details::internal_error(format!("turn failed: {detail}")).into_response()
        }
        ActorError::ActorShutdown => {
            problem_details::conflict("session is shutting down").into_response()
        }
        ActorError::Persistence(detail) => {
            error!(error = %detail, "persistence failure");
            problem_details::internal_error("persistence failure").into_response()
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    let mut context = RoutingContext::new();
    if let Some(client_id) = req.client_id {
        context.set("client_id", client_id);
    }

    let handle = match state.registry.create(context).await {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "failed to create session");
            return problem_details::internal_error("failed to create session").into_response();
        }
    };

    let metadata = match handle.metadata().await {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "failed to get session metadata");
            return problem_details::internal_error("failed to get session metadata")
                .into_response();
        }
    };

    let response = CreateSessionResponse {
        session_id: metadata.id,
        status: metadata.status,
        active_role: metadata.active_role,
        created_at: metadata.created_at.to_rfc3339(),
    };

    (StatusCode::CREATED, Json(response)).into_response()
}

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<ListSessionsResponse> {
    let sessions: Vec<SessionSummary> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|m| SessionSummary {
            session_id: m.id,
            status: m.status,
            active_role: m.active_role,
            created_at: m.created_at.to_rfc3339(),
        })
        .collect();

    Json(ListSessionsResponse { sessions })
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
) -> Response {
    let Some(handle) = state.registry.get(&session_id) else {
        return problem_details::not_found("session not found").into_response();
    };

    let metadata = match handle.metadata().await {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "failed to get session metadata");
            return problem_details::internal_error("failed to get session metadata")
                .into_response();
        }
    };

    let response = GetSessionResponse {
        session_id: metadata.id,
        status: metadata.status,
        active_role: metadata.active_role,
        created_at: metadata.created_at.to_rfc3339(),
        updated_at: metadata.updated_at.to_rfc3339(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// GET /api/v1/sessions/{session_id}/history
///
/// Served from the live actor when present, otherwise straight from the
/// external history store, so history is answerable before any event has
/// been drained and after the actor is gone.
pub async fn get_history(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
) -> Response {
    if let Some(handle) = state.registry.get(&session_id) {
        return match handle.history().await {
            Ok(interactions) => {
                (StatusCode::OK, Json(HistoryResponse { interactions })).into_response()
            }
            Err(e) => actor_error_response(e),
        };
    }

    // Cold path: no live actor. The session must at least have a
    // checkpoint on disk to be known.
    match state.registry.store().load_snapshot(&session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return problem_details::not_found("session not found").into_response(),
        Err(e) => {
            error!(error = %e, "failed to load checkpoint");
            return problem_details::internal_error("failed to load session").into_response();
        }
    }

    match state.registry.history_store().load(&session_id).await {
        Ok(interactions) => {
            (StatusCode::OK, Json(HistoryResponse { interactions })).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to load history");
            problem_details::internal_error("failed to load history").into_response()
        }
    }
}

/// POST /api/v1/sessions/{session_id}/messages
///
/// Synchronous: blocks until the turn completes and returns the new
/// interactions. Rejects empty or oversized input before queueing.
pub async fn process_message(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
    Json(req): Json<ProcessMessageRequest>,
) -> Response {
    let Some(handle) = state.registry.get(&session_id) else {
        return problem_details::not_found("session not found").into_response();
    };

    match handle.process_message(req.content).await {
        Ok(interactions) => {
            (StatusCode::OK, Json(ProcessMessageResponse { interactions })).into_response()
        }
        Err(e) => actor_error_response(e),
    }
}

/// POST /api/v1/sessions/{session_id}/notify
///
/// Fire-and-forget user message.
pub async fn notify_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
    Json(req): Json<ProcessMessageRequest>,
) -> Response {
    let Some(handle) = state.registry.get(&session_id) else {
        return problem_details::not_found("session not found").into_response();
    };

    match handle.submit_user_message(req.content).await {
        Ok(()) => {
            (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })).into_response()
        }
        Err(e) => actor_error_response(e),
    }
}

/// POST /api/v1/sessions/{session_id}/status
///
/// Fire-and-forget external status event.
pub async fn submit_status(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
    Json(req): Json<SubmitStatusRequest>,
) -> Response {
    let Some(handle) = state.registry.get(&session_id) else {
        return problem_details::not_found("session not found").into_response();
    };

    match handle.submit_external_status(req.status).await {
        Ok(()) => {
            (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })).into_response()
        }
        Err(e) => actor_error_response(e),
    }
}

/// POST /api/v1/sessions/{session_id}/terminate
pub async fn terminate_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
) -> Response {
    let Some(handle) = state.registry.get(&session_id) else {
        return problem_details::not_found("session not found").into_response();
    };

    match handle.terminate().await {
        Ok(()) => {
            (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })).into_response()
        }
        Err(e) => actor_error_response(e),
    }
}

/// POST /api/v1/sessions/{session_id}/compact
///
/// Host growth signal: compact at the next safe point.
pub async fn compact_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
) -> Response {
    let Some(handle) = state.registry.get(&session_id) else {
        return problem_details::not_found("session not found").into_response();
    };

    match handle.request_compaction().await {
        Ok(()) => {
            (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })).into_response()
        }
        Err(e) => actor_error_response(e),
    }
}

/// DELETE /api/v1/sessions/{session_id}
pub async fn delete_session(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
) -> Response {
    let Some(handle) = state.registry.get(&session_id) else {
        return problem_details::not_found("session not found").into_response();
    };

    // Best effort: end the session so it will not be recovered.
    let _ = handle.terminate().await;
    let _ = state.registry.remove(&session_id);

    if let Err(e) = state.registry.store().delete(&session_id).await {
        error!(error = %e, "failed to delete session");
        return problem_details::internal_error("failed to delete session").into_response();
    }
    if let Err(e) = state.registry.history_store().delete(&session_id).await {
        error!(error = %e, "failed to delete history");
        return problem_details::internal_error("failed to delete history").into_response();
    }

    StatusCode::NO_CONTENT.into_response()
}
