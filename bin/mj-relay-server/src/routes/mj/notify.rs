//! `POST /mj/notify`: status pushes from the backend.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use mj_relay_core::notify::apply_notification;
use mj_relay_core::schemas::notify::MidjourneyNotify;
use mj_relay_core::RelayError;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(notify), components(schemas(MidjourneyNotify)))]
pub struct NotifyApi;

#[utoipa::path(
    post,
    path = "/mj/notify",
    tag = "midjourney",
    request_body = MidjourneyNotify,
    responses(
        (status = 200, description = "Update applied"),
        (status = 400, description = "Unknown task or unreadable payload"),
        (status = 401, description = "Wrong notify secret"),
    )
)]
pub async fn notify(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ServerError> {
    let update: MidjourneyNotify = serde_json::from_slice(&body)
        .map_err(|_| RelayError::Request("bind_request_body_failed"))?;
    apply_notification(state.store.as_ref(), update).await?;
    Ok(StatusCode::OK)
}
