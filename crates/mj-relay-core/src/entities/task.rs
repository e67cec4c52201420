use std::future::Future;

use sqlx::{QueryBuilder, Sqlite};

use crate::entities::{dao::MjTask, SqliteStore};

const TASK_COLUMNS: &str = "id, user_id, mj_id, action, code, prompt, prompt_en, description, state, \
     submit_time, start_time, finish_time, image_url, status, progress, fail_reason, \
     channel_id, quota, buttons, properties";

pub trait TaskStore: Send + Sync + 'static {
    /// Task `mj_id` owned by `user_id`.
    fn find_task(
        &self,
        user_id: i64,
        mj_id: &str,
    ) -> impl Future<Output = Result<Option<MjTask>, sqlx::Error>> + Send;
    /// Tasks owned by `user_id` among `mj_ids`; unknown ids are skipped.
    fn find_tasks(
        &self,
        user_id: i64,
        mj_ids: &[String],
    ) -> impl Future<Output = Result<Vec<MjTask>, sqlx::Error>> + Send;
    /// Most recent task with this backend id, regardless of owner.
    fn find_task_by_mj_id(
        &self,
        mj_id: &str,
    ) -> impl Future<Output = Result<Option<MjTask>, sqlx::Error>> + Send;
    /// Insert and return the new row id.
    fn insert_task(&self, task: &MjTask) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
    /// Overwrite the backend-reported fields of row `task.id`.
    ///
    /// Owner, action, channel and quota are never rewritten.
    fn update_task(&self, task: &MjTask) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

impl TaskStore for SqliteStore {
    async fn find_task(&self, user_id: i64, mj_id: &str) -> Result<Option<MjTask>, sqlx::Error> {
        sqlx::query_as::<_, MjTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM mj_tasks WHERE user_id = ?1 AND mj_id = ?2 \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(mj_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_tasks(&self, user_id: i64, mj_ids: &[String]) -> Result<Vec<MjTask>, sqlx::Error> {
        if mj_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM mj_tasks WHERE user_id = "));
        query.push_bind(user_id);
        query.push(" AND mj_id IN (");
        let mut ids = query.separated(", ");
        for id in mj_ids {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(") ORDER BY id");
        query.build_query_as::<MjTask>().fetch_all(&self.pool).await
    }

    async fn find_task_by_mj_id(&self, mj_id: &str) -> Result<Option<MjTask>, sqlx::Error> {
        sqlx::query_as::<_, MjTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM mj_tasks WHERE mj_id = ?1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(mj_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_task(&self, task: &MjTask) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO mj_tasks (user_id, mj_id, action, code, prompt, prompt_en, description, state, \
             submit_time, start_time, finish_time, image_url, status, progress, fail_reason, \
             channel_id, quota, buttons, properties) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        )
        .bind(task.user_id)
        .bind(&task.mj_id)
        .bind(&task.action)
        .bind(task.code)
        .bind(&task.prompt)
        .bind(&task.prompt_en)
        .bind(&task.description)
        .bind(&task.state)
        .bind(task.submit_time)
        .bind(task.start_time)
        .bind(task.finish_time)
        .bind(&task.image_url)
        .bind(&task.status)
        .bind(&task.progress)
        .bind(&task.fail_reason)
        .bind(task.channel_id)
        .bind(task.quota)
        .bind(&task.buttons)
        .bind(&task.properties)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_task(&self, task: &MjTask) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE mj_tasks SET code = ?1, prompt_en = ?2, description = ?3, state = ?4, \
             submit_time = ?5, start_time = ?6, finish_time = ?7, image_url = ?8, status = ?9, \
             progress = ?10, fail_reason = ?11, buttons = ?12, properties = ?13 WHERE id = ?14",
        )
        .bind(task.code)
        .bind(&task.prompt_en)
        .bind(&task.description)
        .bind(&task.state)
        .bind(task.submit_time)
        .bind(task.start_time)
        .bind(task.finish_time)
        .bind(&task.image_url)
        .bind(&task.status)
        .bind(&task.progress)
        .bind(&task.fail_reason)
        .bind(&task.buttons)
        .bind(&task.properties)
        .bind(task.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
