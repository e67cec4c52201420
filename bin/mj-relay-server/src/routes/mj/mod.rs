//! Midjourney relay routes.
//!
//! Submission and task reads go through [`distribute`]; the backend's push
//! channel is guarded by the notify secret; the image proxy is public so
//! projected image URLs work in a plain `<img>` tag.

mod image;
mod notify;
mod submit;
mod task;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use utoipa::OpenApi;

use crate::middleware::auth::{check_notify_secret, distribute};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let relay = Router::new()
        .route("/mj/submit/{mode}", post(submit::submit))
        .route("/mj/task/{id}/fetch", get(task::fetch))
        .route("/mj/task/list-by-condition", post(task::list_by_condition))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), distribute));

    let callbacks = Router::new()
        .route("/mj/notify", post(notify::notify))
        .route_layer(middleware::from_fn_with_state(state, check_notify_secret));

    Router::new()
        .merge(relay)
        .merge(callbacks)
        .route("/mj/image/{id}", get(image::relay_image))
}

#[derive(OpenApi)]
#[openapi()]
pub struct MjApi;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = MjApi::openapi();
    spec.merge(submit::SubmitApi::openapi());
    spec.merge(task::TaskApi::openapi());
    spec.merge(notify::NotifyApi::openapi());
    spec.merge(image::ImageApi::openapi());
    spec
}
