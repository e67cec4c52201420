//! Read-side view of stored tasks.

use tracing::debug;

use crate::entities::{MjTask, TaskStore};
use crate::error::RelayError;
use crate::schemas::task::{ActionButton, TaskProperties, TaskView};
use crate::STATUS_SUCCESS;

/// Project `task` for a client, cache-busting with the current time.
pub fn project_task(task: &MjTask, server_address: &str) -> TaskView {
    let now_nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    project_task_at(task, server_address, now_nanos)
}

/// Project `task` using `now_nanos` as the cache-busting value.
///
/// The image is always exposed through `/mj/image/{id}` on `server_address`.
/// Unfinished tasks get a `rand` query parameter so clients do not keep a
/// stale preview; finished ones keep a stable URL.
pub fn project_task_at(task: &MjTask, server_address: &str, now_nanos: i64) -> TaskView {
    let image_url = if task.image_url.is_empty() {
        String::new()
    } else {
        let base = format!("{}/mj/image/{}", server_address.trim_end_matches('/'), task.mj_id);
        if task.status == STATUS_SUCCESS {
            base
        } else {
            format!("{base}?rand={now_nanos}")
        }
    };

    TaskView {
        id: task.mj_id.clone(),
        action: task.action.clone(),
        prompt: task.prompt.clone(),
        prompt_en: task.prompt_en.clone(),
        description: task.description.clone(),
        state: task.state.clone(),
        submit_time: task.submit_time,
        start_time: task.start_time,
        finish_time: task.finish_time,
        image_url,
        status: task.status.clone(),
        progress: task.progress.clone(),
        fail_reason: task.fail_reason.clone(),
        buttons: decode_blob::<Vec<ActionButton>>(&task.buttons, "buttons"),
        properties: decode_blob::<TaskProperties>(&task.properties, "properties"),
    }
}

fn decode_blob<T: serde::de::DeserializeOwned>(blob: &str, field: &'static str) -> Option<T> {
    if blob.is_empty() {
        return None;
    }
    match serde_json::from_str(blob) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(field, error = %e, "dropping malformed task metadata");
            None
        }
    }
}

/// Projection of the caller's task `mj_id`.
pub async fn fetch_task<S: TaskStore>(
    store: &S,
    user_id: i64,
    mj_id: &str,
    server_address: &str,
) -> Result<TaskView, RelayError> {
    let task = store
        .find_task(user_id, mj_id)
        .await?
        .ok_or(RelayError::Precondition("task_no_found"))?;
    Ok(project_task(&task, server_address))
}

/// Projections of the caller's tasks among `mj_ids`; unknown ids are skipped.
pub async fn fetch_tasks<S: TaskStore>(
    store: &S,
    user_id: i64,
    mj_ids: &[String],
    server_address: &str,
) -> Result<Vec<TaskView>, RelayError> {
    let tasks = store.find_tasks(user_id, mj_ids).await?;
    Ok(tasks
        .iter()
        .map(|task| project_task(task, server_address))
        .collect())
}
