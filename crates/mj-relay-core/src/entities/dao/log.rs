/// One usage line appended to the `logs` table after a billed submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeLog {
    pub user_id: i64,
    pub token_id: i64,
    pub token_name: String,
    pub channel_id: i64,
    pub model_name: String,
    pub quota: i64,
    pub content: String,
}
