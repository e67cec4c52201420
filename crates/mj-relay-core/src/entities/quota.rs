//! Quota ledger: balances, debits and usage counters.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::entities::{dao::ConsumeLog, SqliteStore};

pub trait QuotaLedger: Send + Sync + 'static {
    /// Current balance of `user_id`.
    fn user_quota(&self, user_id: i64) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
    /// Credit `quota` to the user's balance.
    fn add_user_quota(&self, user_id: i64, quota: i64) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Debit `quota` from the token (unless unlimited) and from the user.
    fn consume_token_quota(
        &self,
        token_id: i64,
        user_id: i64,
        quota: i64,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn record_consume_log(
        &self,
        log: &ConsumeLog,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Bump the user's used-quota and request counters.
    fn add_user_used_quota(
        &self,
        user_id: i64,
        quota: i64,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn add_channel_used_quota(
        &self,
        channel_id: i64,
        quota: i64,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

impl QuotaLedger for SqliteStore {
    async fn user_quota(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        let (quota,): (i64,) = sqlx::query_as("SELECT quota FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(quota)
    }

    async fn add_user_quota(&self, user_id: i64, quota: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET quota = quota + ?1 WHERE id = ?2")
            .bind(quota)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_token_quota(
        &self,
        token_id: i64,
        user_id: i64,
        quota: i64,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE tokens SET \
             remain_quota = CASE WHEN unlimited_quota = 1 THEN remain_quota ELSE remain_quota - ?1 END, \
             used_quota = used_quota + ?1 \
             WHERE id = ?2",
        )
        .bind(quota)
        .bind(token_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE users SET quota = quota - ?1 WHERE id = ?2")
            .bind(quota)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    async fn record_consume_log(&self, log: &ConsumeLog) -> Result<(), sqlx::Error> {
        let created_at = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO logs (user_id, created_at, content, token_name, model_name, quota, channel_id, token_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(log.user_id)
        .bind(&created_at)
        .bind(&log.content)
        .bind(&log.token_name)
        .bind(&log.model_name)
        .bind(log.quota)
        .bind(log.channel_id)
        .bind(log.token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_user_used_quota(&self, user_id: i64, quota: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET used_quota = used_quota + ?1, request_count = request_count + 1 WHERE id = ?2",
        )
        .bind(quota)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_channel_used_quota(&self, channel_id: i64, quota: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE channels SET used_quota = used_quota + ?1 WHERE id = ?2")
            .bind(quota)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// How long a cached balance is trusted before the ledger is read again.
pub const DEFAULT_QUOTA_CACHE_TTL: Duration = Duration::from_secs(60);

/// In-process cache of user balances read by the submission pre-check.
///
/// Entries expire after `ttl`, so a balance lowered in the ledger is seen
/// within one TTL. Not a lock: two concurrent submissions from one user may
/// both pass the pre-check before either is billed.
pub struct QuotaCache {
    balances: Mutex<HashMap<i64, (i64, Instant)>>,
    ttl: Duration,
}

impl Default for QuotaCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_QUOTA_CACHE_TTL)
    }
}

impl std::fmt::Debug for QuotaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.balances.lock().map(|b| b.len()).unwrap_or(0);
        write!(f, "QuotaCache({count} users, ttl {:?})", self.ttl)
    }
}

impl QuotaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached balance of `user_id`, loading it from `ledger` on a miss or
    /// once the entry has expired.
    pub async fn get_or_load<L: QuotaLedger>(&self, ledger: &L, user_id: i64) -> Result<i64, sqlx::Error> {
        if let Some(quota) = self.cached(user_id) {
            return Ok(quota);
        }
        self.refresh(ledger, user_id).await
    }

    /// Reload the balance of `user_id` from the ledger and return it.
    pub async fn refresh<L: QuotaLedger>(&self, ledger: &L, user_id: i64) -> Result<i64, sqlx::Error> {
        self.invalidate(user_id);
        let quota = ledger.user_quota(user_id).await?;
        self.store(user_id, quota);
        Ok(quota)
    }

    pub fn invalidate(&self, user_id: i64) {
        if let Ok(mut map) = self.balances.lock() {
            map.remove(&user_id);
        }
    }

    fn cached(&self, user_id: i64) -> Option<i64> {
        let map = self.balances.lock().ok()?;
        let (quota, loaded_at) = map.get(&user_id)?;
        (loaded_at.elapsed() < self.ttl).then_some(*quota)
    }

    fn store(&self, user_id: i64, quota: i64) {
        if let Ok(mut map) = self.balances.lock() {
            map.insert(user_id, (quota, Instant::now()));
        }
    }
}
