/// A row in the `users` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[sqlx(rename = "user_group")]
    pub group: String,
    /// Remaining balance in quota units.
    pub quota: i64,
    pub used_quota: i64,
    pub request_count: i64,
    pub status: i64,
}

/// A row in the `tokens` table: an API key owned by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct TokenRecord {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(rename = "token_key")]
    pub key: String,
    pub name: String,
    pub status: i64,
    pub remain_quota: i64,
    pub used_quota: i64,
    pub unlimited_quota: bool,
}
