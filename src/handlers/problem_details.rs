//! RFC 7807 problem-details responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    pub status: u16,
    pub title: String,
    pub detail: String,
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

fn problem(status: StatusCode, detail: impl Into<String>) -> ProblemDetails {
    ProblemDetails {
        status: status.as_u16(),
        title: status
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string(),
        detail: detail.into(),
    }
}

pub fn not_found(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::NOT_FOUND, detail)
}

pub fn validation_error(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::UNPROCESSABLE_ENTITY, detail)
}

pub fn conflict(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::CONFLICT, detail)
}

pub fn internal_error(detail: impl Into<String>) -> ProblemDetails {
    problem(StatusCode::INTERNAL_SERVER_ERROR, detail)
}
