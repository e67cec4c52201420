use std::future::Future;

use sqlx::{QueryBuilder, Sqlite};

use crate::entities::{dao::ChannelRecord, SqliteStore};

const CHANNEL_COLUMNS: &str =
    "id, channel_type, name, channel_key, base_url, model_mapping, channel_group, status, used_quota";

/// Channel status value for an enabled channel.
pub const CHANNEL_STATUS_ENABLED: i64 = 1;

pub trait ChannelStore: Send + Sync + 'static {
    fn get_channel(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<ChannelRecord>, sqlx::Error>> + Send;
    /// First enabled channel of `group` whose type is one of `types`.
    fn pick_channel(
        &self,
        group: &str,
        types: &[i32],
    ) -> impl Future<Output = Result<Option<ChannelRecord>, sqlx::Error>> + Send;
    fn insert_channel(
        &self,
        channel: &ChannelRecord,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

impl ChannelStore for SqliteStore {
    async fn get_channel(&self, id: i64) -> Result<Option<ChannelRecord>, sqlx::Error> {
        sqlx::query_as::<_, ChannelRecord>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn pick_channel(
        &self,
        group: &str,
        types: &[i32],
    ) -> Result<Option<ChannelRecord>, sqlx::Error> {
        if types.is_empty() {
            return Ok(None);
        }
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE status = "));
        query.push_bind(CHANNEL_STATUS_ENABLED);
        query.push(" AND channel_group = ");
        query.push_bind(group);
        query.push(" AND channel_type IN (");
        let mut kinds = query.separated(", ");
        for kind in types {
            kinds.push_bind(*kind);
        }
        kinds.push_unseparated(") ORDER BY id LIMIT 1");
        query
            .build_query_as::<ChannelRecord>()
            .fetch_optional(&self.pool)
            .await
    }

    async fn insert_channel(&self, channel: &ChannelRecord) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO channels (channel_type, name, channel_key, base_url, model_mapping, channel_group, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(channel.channel_type)
        .bind(&channel.name)
        .bind(&channel.key)
        .bind(&channel.base_url)
        .bind(&channel.model_mapping)
        .bind(&channel.group)
        .bind(channel.status)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn channel(channel_type: i32, group: &str, status: i64) -> ChannelRecord {
        ChannelRecord {
            channel_type,
            name: format!("mj-{channel_type}"),
            key: "secret".into(),
            base_url: Some("https://mj.example".into()),
            group: group.into(),
            status,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pick_channel_filters_group_type_and_status() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_channel(&channel(2, "default", 0)).await.unwrap();
        store.insert_channel(&channel(1, "default", 1)).await.unwrap();
        let wanted = store.insert_channel(&channel(27, "default", 1)).await.unwrap();
        store.insert_channel(&channel(2, "vip", 1)).await.unwrap();

        let picked = store.pick_channel("default", &[2, 27]).await.unwrap().unwrap();
        assert_eq!(picked.id, wanted);
        assert_eq!(picked.key, "secret");
        assert!(store.pick_channel("svip", &[2, 27]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_channel_round_trips_optional_columns() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut record = channel(2, "default", 1);
        record.model_mapping = Some(r#"{"midjourney":"mj-fast"}"#.into());
        let id = store.insert_channel(&record).await.unwrap();

        let stored = store.get_channel(id).await.unwrap().unwrap();
        assert_eq!(stored.model_mapping, record.model_mapping);
        assert_eq!(stored.base_url.as_deref(), Some("https://mj.example"));
        assert!(store.get_channel(id + 1).await.unwrap().is_none());
    }
}
