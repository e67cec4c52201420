use std::future::Future;

use crate::entities::{
    dao::{TokenRecord, UserRecord},
    SqliteStore,
};

const USER_COLUMNS: &str = "id, username, user_group, quota, used_quota, request_count, status";
const TOKEN_COLUMNS: &str =
    "id, user_id, token_key, name, status, remain_quota, used_quota, unlimited_quota";

/// Status value of an enabled user.
pub const USER_STATUS_ENABLED: i64 = 1;
/// Status value of an enabled token.
pub const TOKEN_STATUS_ENABLED: i64 = 1;

pub trait TokenStore: Send + Sync + 'static {
    fn find_token_by_key(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<TokenRecord>, sqlx::Error>> + Send;
    fn get_user(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;
    fn insert_user(&self, user: &UserRecord) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
    fn insert_token(
        &self,
        token: &TokenRecord,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

impl TokenStore for SqliteStore {
    async fn find_token_by_key(&self, key: &str) -> Result<Option<TokenRecord>, sqlx::Error> {
        sqlx::query_as::<_, TokenRecord>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_key = ?1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (username, user_group, quota, used_quota, request_count, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&user.username)
        .bind(&user.group)
        .bind(user.quota)
        .bind(user.used_quota)
        .bind(user.request_count)
        .bind(user.status)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_token(&self, token: &TokenRecord) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO tokens (user_id, token_key, name, status, remain_quota, used_quota, unlimited_quota) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(token.user_id)
        .bind(&token.key)
        .bind(&token.name)
        .bind(token.status)
        .bind(token.remain_quota)
        .bind(token.used_quota)
        .bind(token.unlimited_quota)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
