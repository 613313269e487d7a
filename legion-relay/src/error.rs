//! Error types for the relay: HTTP-facing API errors and connection-level send failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced to HTTP callers as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("API error: {}", self);
        } else {
            warn!("API error: {}", self);
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Failure of a single `Connection::send`.
///
/// `Closed` means the peer is gone and the connection must be pruned.
/// `Full` means the peer is alive but behind: the payload is dropped for it only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("connection send buffer full")]
    Full,
}

/// Unrecognised path segment for a channel kind or role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value}")]
pub struct ParseSegmentError {
    pub what: &'static str,
    pub value: String,
}

impl From<ParseSegmentError> for ApiError {
    fn from(err: ParseSegmentError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}
