//! `GET /mj/image/{id}`: same-origin proxy for task images.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use mj_relay_core::entities::TaskStore;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(relay_image))]
pub struct ImageApi;

#[utoipa::path(
    get,
    path = "/mj/image/{id}",
    tag = "midjourney",
    params(
        ("id" = String, Path, description = "Backend task id")
    ),
    responses(
        (status = 200, description = "Image bytes streamed from the backend"),
        (status = 400, description = "midjourney_task_not_found"),
        (status = 500, description = "http_get_image_failed"),
    )
)]
pub async fn relay_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let task = state
        .store
        .find_task_by_mj_id(&id)
        .await?
        .ok_or_else(|| ServerError::BadRequest("midjourney_task_not_found".into()))?;

    let upstream = state
        .engine
        .backend()
        .fetch_image(&task.image_url)
        .await
        .map_err(|e| ServerError::ImageFetch(e.to_string()))?;

    let status = upstream.status();
    if status != StatusCode::OK {
        let body = upstream.text().await.unwrap_or_default();
        return Err(ServerError::UpstreamStatus { status, body });
    }

    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("image/jpeg"));
    let body = Body::from_stream(upstream.bytes_stream());
    Ok(([(CONTENT_TYPE, content_type)], body).into_response())
}
