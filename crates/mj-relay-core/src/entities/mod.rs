//! Persistence layer.
//!
//! Each concern gets its own store trait ([`TaskStore`], [`ChannelStore`],
//! [`TokenStore`], [`QuotaLedger`]) implemented by [`SqliteStore`].  To swap
//! to another database, implement the traits for a new type; the engine is
//! generic over them.
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod channel;
pub mod dao;
pub mod quota;
pub mod task;
pub mod token;

pub use dao::{ChannelRecord, ConsumeLog, MjTask, TokenRecord, UserRecord};

pub use channel::{ChannelStore, CHANNEL_STATUS_ENABLED};
pub use quota::{QuotaCache, QuotaLedger, DEFAULT_QUOTA_CACHE_TTL};
pub use task::TaskStore;
pub use token::{TokenStore, TOKEN_STATUS_ENABLED, USER_STATUS_ENABLED};

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// SQLite-backed implementation of every store trait.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://mj-relay.db"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::migrate(pool).await
    }

    /// Fresh private in-memory database, used by tests.
    ///
    /// A single connection keeps every query on the same memory database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    /// Round-trip a trivial query; fails once the pool is closed or the
    /// database file is unreachable.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection. Later queries fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}
