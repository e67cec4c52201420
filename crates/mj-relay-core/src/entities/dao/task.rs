/// A row in the `mj_tasks` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct MjTask {
    pub id: i64,
    pub user_id: i64,
    /// Backend-assigned task id; empty when the backend rejected the submission.
    pub mj_id: String,
    pub action: String,
    /// Submission code after duplicate normalization.
    pub code: i64,
    pub prompt: String,
    pub prompt_en: String,
    pub description: String,
    pub state: String,
    /// Epoch milliseconds; `0` until reached.
    pub submit_time: i64,
    pub start_time: i64,
    pub finish_time: i64,
    pub image_url: String,
    pub status: String,
    pub progress: String,
    pub fail_reason: String,
    /// Backend instance that owns the task; fixed at creation.
    pub channel_id: i64,
    /// Charged at creation, never adjusted afterwards.
    pub quota: i64,
    /// Serialized `Vec<ActionButton>`; empty when unknown.
    pub buttons: String,
    /// Serialized `TaskProperties`; empty when unknown.
    pub properties: String,
}
