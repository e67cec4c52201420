//! Unified server error type.
//!
//! Relay endpoints answer failures with the Midjourney envelope
//! (`{"code", "description", ...}`, HTTP 400); everything else renders
//! `{"error": "..."}`.  Database and internal detail is logged, never
//! returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mj_relay_core::RelayError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    /// A relay operation failed; rendered as the Midjourney envelope.
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// No channel can serve the caller.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The image host answered with a non-200 status.
    #[error("upstream status {status}")]
    UpstreamStatus { status: StatusCode, body: String },

    /// The image host could not be reached.
    #[error("image fetch failed: {0}")]
    ImageFetch(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match self {
            ServerError::Relay(e) => {
                warn!(code = e.code(), reason = e.reason(), "relay request failed");
                return (StatusCode::BAD_REQUEST, Json(e.to_response())).into_response();
            }
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ServerError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ServerError::UpstreamStatus { status, body } => (status, body),
            ServerError::ImageFetch(m) => {
                error!(error = %m, "failed to fetch task image");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "http_get_image_failed".to_owned(),
                )
            }
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}
