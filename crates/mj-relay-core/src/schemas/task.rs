use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::null_as_default;

/// Client-facing view of a stored task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: String,
    pub action: String,
    pub prompt: String,
    pub prompt_en: String,
    pub description: String,
    pub state: String,
    pub submit_time: i64,
    pub start_time: i64,
    pub finish_time: i64,
    /// Same-origin proxy URL; never the backend's own location.
    pub image_url: String,
    pub status: String,
    pub progress: String,
    pub fail_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<ActionButton>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<TaskProperties>,
}

/// A follow-up button the backend offers on a finished task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionButton {
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub emoji: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default", rename = "type")]
    pub kind: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub style: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskProperties {
    #[serde(default, deserialize_with = "null_as_default")]
    pub final_prompt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub final_zh_prompt: String,
}

/// Body of `POST /mj/task/list-by-condition`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TaskCondition {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ids: Vec<String>,
}
