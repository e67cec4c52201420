use std::collections::HashMap;

/// A row in the `channels` table: one configured backend instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ChannelRecord {
    pub id: i64,
    pub channel_type: i32,
    pub name: String,
    /// Secret presented to the backend as `mj-api-secret`.
    #[sqlx(rename = "channel_key")]
    pub key: String,
    pub base_url: Option<String>,
    /// JSON object remapping model names, e.g. `{"midjourney":"mj-fast"}`.
    pub model_mapping: Option<String>,
    #[sqlx(rename = "channel_group")]
    pub group: String,
    pub status: i64,
    pub used_quota: i64,
}

impl ChannelRecord {
    /// The channel's own base URL, else the default for its type.
    pub fn resolved_base_url(&self, defaults: &HashMap<i32, String>) -> Option<String> {
        self.base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| defaults.get(&self.channel_type).map(String::as_str))
            .filter(|u| !u.is_empty())
            .map(str::to_owned)
    }
}
