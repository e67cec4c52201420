use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::task::{ActionButton, TaskProperties};
use super::{lenient, null_as_default};

/// Status update pushed by the backend to `POST /mj/notify`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MidjourneyNotify {
    /// Backend task id.
    #[serde(alias = "mjId")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_en: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub submit_time: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_time: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub finish_time: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fail_reason: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<ActionButton>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub properties: Option<TaskProperties>,
}
