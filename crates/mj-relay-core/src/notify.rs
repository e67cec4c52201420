//! Backend push notifications.
//!
//! The backend reports progress by posting a [`MidjourneyNotify`] keyed by
//! its own task id.  The update is applied onto the latest stored row with
//! that id; it never creates one.

use tracing::{debug, error};

use crate::entities::{MjTask, TaskStore};
use crate::error::RelayError;
use crate::schemas::notify::MidjourneyNotify;

/// Apply `notify` to the stored task and return the updated row.
///
/// Applying the same payload twice leaves the row unchanged after the
/// second call.
pub async fn apply_notification<S: TaskStore>(
    store: &S,
    notify: MidjourneyNotify,
) -> Result<MjTask, RelayError> {
    let mut task = store
        .find_task_by_mj_id(&notify.id)
        .await?
        .ok_or(RelayError::Precondition("midjourney_task_not_found"))?;

    merge_notification(&mut task, notify);
    store.update_task(&task).await.map_err(|e| {
        error!(error = %e, mj_id = %task.mj_id, "failed to update midjourney task");
        RelayError::Persistence("update_midjourney_task_failed")
    })?;

    debug!(
        mj_id = %task.mj_id,
        status = %task.status,
        progress = %task.progress,
        "notification applied"
    );
    Ok(task)
}

fn merge_notification(task: &mut MjTask, notify: MidjourneyNotify) {
    task.progress = notify.progress;
    task.prompt_en = notify.prompt_en;
    task.state = notify.state;
    task.submit_time = notify.submit_time;
    task.start_time = notify.start_time;
    task.finish_time = notify.finish_time;
    task.image_url = notify.image_url;
    task.status = notify.status;
    task.fail_reason = notify.fail_reason;

    if let Some(buttons) = notify.buttons {
        if let Ok(blob) = serde_json::to_string(&buttons) {
            task.buttons = blob;
        }
    }
    if let Some(properties) = notify.properties {
        if let Ok(blob) = serde_json::to_string(&properties) {
            task.properties = blob;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::SqliteStore;

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_task(&MjTask {
                user_id: 7,
                mj_id: "T1".into(),
                action: "IMAGINE".into(),
                code: 1,
                prompt: "a cat".into(),
                progress: "0%".into(),
                channel_id: 3,
                quota: 50_000,
                buttons: r#"[{"customId":"old"}]"#.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
    }

    fn payload() -> MidjourneyNotify {
        serde_json::from_str(
            r#"{"mjId":"T1","progress":"100%","promptEn":"a cat","status":"SUCCESS",
                "startTime":10,"finishTime":20,"submitTime":5,
                "imageUrl":"https://cdn/x.png","failReason":null}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn overwrites_progress_fields_only() {
        let store = seeded().await;
        let updated = apply_notification(&store, payload()).await.unwrap();

        assert_eq!(updated.status, "SUCCESS");
        assert_eq!(updated.progress, "100%");
        assert_eq!(updated.image_url, "https://cdn/x.png");
        assert_eq!(updated.finish_time, 20);

        let stored = store.find_task_by_mj_id("T1").await.unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.quota, 50_000);
        assert_eq!(stored.channel_id, 3);
        assert_eq!(stored.action, "IMAGINE");
        // no buttons in the payload: the stored blob is kept
        assert_eq!(stored.buttons, r#"[{"customId":"old"}]"#);
    }

    #[tokio::test]
    async fn reapplying_is_idempotent() {
        let store = seeded().await;
        apply_notification(&store, payload()).await.unwrap();
        let first = store.find_task_by_mj_id("T1").await.unwrap().unwrap();
        apply_notification(&store, payload()).await.unwrap();
        let second = store.find_task_by_mj_id("T1").await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn buttons_are_stored_when_present() {
        let store = seeded().await;
        let notify: MidjourneyNotify = serde_json::from_str(
            r#"{"id":"T1","status":"SUCCESS","buttons":[{"customId":"MJ::JOB::upsample::1::x","label":"U1","type":2,"style":2}]}"#,
        )
        .unwrap();
        let updated = apply_notification(&store, notify).await.unwrap();
        assert!(updated.buttons.contains("MJ::JOB::upsample::1::x"));
    }

    #[tokio::test]
    async fn unknown_task_is_not_created() {
        let store = seeded().await;
        let notify = MidjourneyNotify {
            id: "missing".into(),
            ..Default::default()
        };
        let err = apply_notification(&store, notify).await.unwrap_err();
        assert_eq!(err.reason(), "midjourney_task_not_found");
        assert!(store.find_task_by_mj_id("missing").await.unwrap().is_none());
    }
}
