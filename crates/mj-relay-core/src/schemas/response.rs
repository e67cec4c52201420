use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::null_as_default;

/// Backend code: submission accepted.
pub const CODE_SUBMITTED: i64 = 1;
/// Backend code: the task already exists and may already be finished.
pub const CODE_EXISTED: i64 = 21;
/// Backend code: the task already exists and is waiting in the queue.
pub const CODE_QUEUED: i64 = 22;

/// The `{code, description, properties, result}` envelope the backend answers
/// every submission with, and the shape this relay reports its own errors in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MidjourneyResponse {
    pub code: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub properties: Option<SubmitProperties>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: String,
}

impl MidjourneyResponse {
    pub fn error(code: i64, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            properties: None,
            result: String::new(),
        }
    }
}

/// The `properties` bag of a submission response, narrowed to the shapes the
/// relay actually consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmitProperties {
    /// Code 21: the task exists, carrying its current status and image.
    Existing {
        status: String,
        #[serde(rename = "imageUrl")]
        image_url: String,
        /// Opaque; backends send it as a string or a number.
        #[serde(rename = "discordInstanceId", default, skip_serializing_if = "Option::is_none")]
        discord_instance_id: Option<serde_json::Value>,
    },
    /// Code 22: the task is queued behind `number_of_queues` others.
    Queued {
        #[serde(rename = "numberOfQueues")]
        number_of_queues: i64,
        #[serde(rename = "discordInstanceId", default, skip_serializing_if = "Option::is_none")]
        discord_instance_id: Option<serde_json::Value>,
    },
    /// Code 24: the prompt was rejected for a banned word.
    Banned {
        #[serde(rename = "promptEn")]
        prompt_en: String,
        #[serde(rename = "bannedWord")]
        banned_word: String,
    },
    /// Any other shape, kept only so it survives re-serialization.
    Unrecognized(serde_json::Value),
}
