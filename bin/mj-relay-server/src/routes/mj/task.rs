//! Task polling endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use mj_relay_core::projection::{fetch_task, fetch_tasks};
use mj_relay_core::schemas::task::{ActionButton, TaskCondition, TaskProperties, TaskView};
use mj_relay_core::{RelayContext, RelayError};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(fetch, list_by_condition),
    components(schemas(TaskView, ActionButton, TaskProperties, TaskCondition))
)]
pub struct TaskApi;

#[utoipa::path(
    get,
    path = "/mj/task/{id}/fetch",
    tag = "midjourney",
    params(
        ("id" = String, Path, description = "Backend task id")
    ),
    responses(
        (status = 200, description = "Task state", body = TaskView),
        (status = 400, description = "task_no_found"),
    )
)]
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RelayContext>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ServerError> {
    let view = fetch_task(
        state.store.as_ref(),
        ctx.user_id,
        &id,
        &state.engine.settings().server_address,
    )
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/mj/task/list-by-condition",
    tag = "midjourney",
    request_body = TaskCondition,
    responses(
        (status = 200, description = "Known tasks among the requested ids", body = [TaskView]),
        (status = 400, description = "do_request_failed"),
    )
)]
pub async fn list_by_condition(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RelayContext>,
    body: Bytes,
) -> Result<Json<Vec<TaskView>>, ServerError> {
    let condition: TaskCondition = serde_json::from_slice(&body)
        .map_err(|_| RelayError::Request("do_request_failed"))?;
    let views = fetch_tasks(
        state.store.as_ref(),
        ctx.user_id,
        &condition.ids,
        &state.engine.settings().server_address,
    )
    .await?;
    Ok(Json(views))
}
