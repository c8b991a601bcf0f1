//! Health and version endpoints.

use axum::Json;
use axum::http::StatusCode;
use serde_json::{Value, json};

/// GET /livez
pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// GET /readyz
pub async fn readyz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// GET /version
pub async fn version() -> Json<Value> {
    Json(json!({ "version": crate::build_info::VERSION }))
}
