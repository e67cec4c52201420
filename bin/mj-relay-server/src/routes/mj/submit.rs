//! `POST /mj/submit/{mode}`.

use std::str::FromStr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, Request, State};
use axum::response::Response;
use axum::Extension;
use mj_relay_core::schemas::request::MidjourneyRequest;
use mj_relay_core::schemas::response::MidjourneyResponse;
use mj_relay_core::{RelayContext, RelayError, RelayMode, SubmitRequest};
use tracing::Instrument;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

/// Upper bound on a buffered submission body (blend uploads carry base64 images).
const MAX_SUBMIT_BODY: usize = 32 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(submit),
    components(schemas(MidjourneyRequest, MidjourneyResponse))
)]
pub struct SubmitApi;

#[utoipa::path(
    post,
    path = "/mj/submit/{mode}",
    tag = "midjourney",
    params(
        ("mode" = String, Path, description = "imagine, describe, shorten, blend, change, simple-change, modal or action")
    ),
    request_body = MidjourneyRequest,
    responses(
        (status = 200, description = "Backend reply, duplicate codes normalized", body = MidjourneyResponse),
        (status = 400, description = "Rejected submission", body = MidjourneyResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "No channel available"),
    )
)]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(mode): Path<String>,
    Extension(ctx): Extension<RelayContext>,
    req: Request,
) -> Result<Response, ServerError> {
    let mode = RelayMode::from_str(&mode)
        .map_err(|_| ServerError::NotFound(format!("unknown submit mode {mode}")))?;

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, MAX_SUBMIT_BODY)
        .await
        .map_err(|_| RelayError::Request("read_request_body_failed"))?;
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| parts.uri.path().to_owned());

    let submission = state
        .engine
        .submit(
            &ctx,
            SubmitRequest {
                mode,
                method: parts.method,
                path_and_query,
                headers: parts.headers,
                body,
            },
        )
        .await?;

    let mut response = Response::new(Body::from(submission.body));
    *response.status_mut() = submission.status;
    *response.headers_mut() = submission.headers;

    if let Some(hook) = submission.billing {
        let engine = state.engine.clone();
        tokio::spawn(async move { engine.commit_billing(hook).await }.in_current_span());
    }
    Ok(response)
}
