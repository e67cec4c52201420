use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::null_as_default;

/// Body of every `POST /mj/submit/*` request.
///
/// Which fields matter depends on the relay mode: `prompt` for imagine,
/// `customId` for the plus dialect, `content` for simple-change,
/// `maskBase64` for the modal in-paint confirmation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MidjourneyRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub custom_id: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub bot_type: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub notify_hook: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "is_zero")]
    pub index: i32,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub base64_array: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub mask_base64: String,
    /// Fields this relay does not interpret, forwarded as received.
    #[serde(flatten)]
    #[schema(ignore)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nulls_bind_as_empty_fields() {
        let req: MidjourneyRequest =
            serde_json::from_str(r#"{"prompt":"a cat","taskId":null,"index":null}"#).unwrap();
        assert_eq!(req.prompt, "a cat");
        assert!(req.task_id.is_empty());
        assert_eq!(req.index, 0);
    }

    #[test]
    fn serializes_camel_case_and_omits_unset_fields() {
        let req = MidjourneyRequest {
            prompt: "p".into(),
            task_id: "T1".into(),
            index: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"prompt": "p", "taskId": "T1", "index": 2}));
    }

    #[test]
    fn unknown_fields_survive_reserialization() {
        let req: MidjourneyRequest =
            serde_json::from_str(r#"{"prompt":"p","accountFilter":{"modes":["FAST"]}}"#).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["accountFilter"]["modes"][0], "FAST");
        assert_eq!(json["prompt"], "p");
    }
}
