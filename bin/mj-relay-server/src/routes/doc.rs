use utoipa::OpenApi;

use crate::routes::{health, mj};

#[derive(OpenApi)]
#[openapi(info(
    title = "mj-relay-server",
    description = "Midjourney task relay API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(mj::api_docs());
    root
}
