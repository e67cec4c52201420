//! Submission engine.
//!
//! One call to [`SubmissionEngine::submit`] is one client submission:
//! resolve the action, route it, price it, forward it once, normalize the
//! backend's duplicate codes, persist the task, and return the (possibly
//! rewritten) backend reply together with a [`BillingHook`].  The hook is
//! committed by the caller after the response has been handed off, so
//! billing never delays or fails a response.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode};
use tracing::{debug, error, info, warn};

use crate::action::{resolve_action, Action, RelayMode};
use crate::backend::{bearer_secret, BackendRequest, MjBackendClient};
use crate::entities::{ChannelStore, ConsumeLog, MjTask, QuotaCache, QuotaLedger, TaskStore};
use crate::error::RelayError;
use crate::pricing::{ensure_affordable, Quote};
use crate::routing::{check_origin_status, primary_route, sticky_route, RelayContext};
use crate::schemas::request::MidjourneyRequest;
use crate::schemas::response::{
    MidjourneyResponse, SubmitProperties, CODE_EXISTED, CODE_QUEUED, CODE_SUBMITTED,
};
use crate::settings::RelaySettings;
use crate::STATUS_SUCCESS;

/// Model name billed for every submission unless the channel remaps it.
pub const IMAGE_MODEL: &str = "midjourney";

/// An incoming submission, as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub mode: RelayMode,
    pub method: Method,
    /// Path and query of the incoming request; appended to the channel base URL.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The reply to pass through to the caller, plus deferred billing.
#[derive(Debug)]
pub struct Submission {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The persisted task row.
    pub task: MjTask,
    /// `None` when the outcome is not chargeable.
    pub billing: Option<BillingHook>,
}

/// Deferred quota debit for one chargeable submission.
///
/// Consumed by [`BillingHook::commit`], so a submission is billed at most once.
#[must_use = "a billing hook charges nothing until committed"]
#[derive(Debug, Clone, PartialEq)]
pub struct BillingHook {
    pub user_id: i64,
    pub token_id: i64,
    pub token_name: String,
    pub channel_id: i64,
    pub model_name: String,
    pub action: Action,
    pub quote: Quote,
}

impl BillingHook {
    /// Debit the caller and record usage.  Failures are logged, never
    /// returned: the response has already been sent.
    pub async fn commit<L: QuotaLedger>(self, ledger: &L, cache: &QuotaCache) {
        let quota = self.quote.quota;
        if let Err(e) = ledger.consume_token_quota(self.token_id, self.user_id, quota).await {
            error!(error = %e, user_id = self.user_id, token_id = self.token_id, "failed to consume token quota");
        }
        if let Err(e) = cache.refresh(ledger, self.user_id).await {
            error!(error = %e, user_id = self.user_id, "failed to refresh user quota cache");
        }
        if quota == 0 {
            return;
        }

        let log = ConsumeLog {
            user_id: self.user_id,
            token_id: self.token_id,
            token_name: self.token_name,
            channel_id: self.channel_id,
            model_name: self.model_name,
            quota,
            content: format!(
                "model price {:.2}, group ratio {:.2}, action {}",
                self.quote.price, self.quote.group_ratio, self.action
            ),
        };
        if let Err(e) = ledger.record_consume_log(&log).await {
            error!(error = %e, user_id = self.user_id, "failed to record consume log");
        }
        if let Err(e) = ledger.add_user_used_quota(self.user_id, quota).await {
            error!(error = %e, user_id = self.user_id, "failed to update user used quota");
        }
        if let Err(e) = ledger.add_channel_used_quota(self.channel_id, quota).await {
            error!(error = %e, channel_id = self.channel_id, "failed to update channel used quota");
        }
        info!(user_id = self.user_id, quota, action = %self.action, "submission billed");
    }
}

/// How a backend code was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub chargeable: bool,
    /// The code was rewritten and the body must be re-serialized.
    pub rewritten: bool,
}

pub struct SubmissionEngine<S> {
    store: Arc<S>,
    settings: Arc<RelaySettings>,
    backend: MjBackendClient,
    quota_cache: Arc<QuotaCache>,
}

impl<S> Clone for SubmissionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: Arc::clone(&self.settings),
            backend: self.backend.clone(),
            quota_cache: Arc::clone(&self.quota_cache),
        }
    }
}

impl<S> std::fmt::Debug for SubmissionEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionEngine")
            .field("settings", &self.settings)
            .field("quota_cache", &self.quota_cache)
            .finish_non_exhaustive()
    }
}

impl<S> SubmissionEngine<S>
where
    S: TaskStore + ChannelStore + QuotaLedger,
{
    pub fn new(store: Arc<S>, settings: Arc<RelaySettings>, backend: MjBackendClient) -> Self {
        let quota_cache = Arc::new(QuotaCache::with_ttl(settings.quota_cache_ttl));
        Self {
            store,
            settings,
            backend,
            quota_cache,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn backend(&self) -> &MjBackendClient {
        &self.backend
    }

    pub async fn submit(
        &self,
        ctx: &RelayContext,
        req: SubmitRequest,
    ) -> Result<Submission, RelayError> {
        let mut mj_req: MidjourneyRequest = serde_json::from_slice(&req.body)
            .map_err(|_| RelayError::Request("bind_request_body_failed"))?;
        let resolved = resolve_action(req.mode, &mut mj_req)?;

        let route = match &resolved.target_task_id {
            Some(target) => {
                let origin = self
                    .store
                    .find_task(ctx.user_id, target)
                    .await?
                    .ok_or(RelayError::Precondition("task_not_found"))?;
                check_origin_status(resolved.mode, &origin)?;
                let route =
                    sticky_route(self.store.as_ref(), &self.settings.channel_base_urls, &origin)
                        .await?;
                mj_req.prompt = origin.prompt;
                route
            }
            None => primary_route(ctx, &self.settings.channel_base_urls)?,
        };

        let (model_name, model_mapped) = map_model_name(ctx.model_mapping.as_deref())?;
        let quote = self.settings.pricing.quote(resolved.action, &ctx.group);
        let balance = self
            .quota_cache
            .get_or_load(self.store.as_ref(), ctx.user_id)
            .await?;
        if ensure_affordable(&quote, balance).is_err() {
            // A cached balance may predate a top-up; only the ledger can refuse.
            let balance = self.quota_cache.refresh(self.store.as_ref(), ctx.user_id).await?;
            ensure_affordable(&quote, balance)?;
        }

        let secret = bearer_secret(req.headers.get(AUTHORIZATION))?;
        let body = if model_mapped {
            serde_json::to_vec(&mj_req)
                .map(Bytes::from)
                .map_err(|_| RelayError::Request("marshal_text_request_failed"))?
        } else {
            req.body
        };

        let reply = self
            .backend
            .dispatch(BackendRequest {
                method: req.method,
                url: format!("{}{}", route.base_url.trim_end_matches('/'), req.path_and_query),
                content_type: req.headers.get(CONTENT_TYPE).cloned(),
                accept: req.headers.get(ACCEPT).cloned(),
                secret,
                body,
            })
            .await?;
        if reply.status != StatusCode::OK {
            warn!(status = %reply.status, "unexpected backend response status");
            return Err(RelayError::Upstream("unexpected_response_status"));
        }
        debug!(body = %String::from_utf8_lossy(&reply.body), "backend response body");
        let mut response: MidjourneyResponse = serde_json::from_slice(&reply.body).map_err(|e| {
            warn!(error = %e, "failed to parse backend response");
            RelayError::Upstream("unmarshal_response_body_failed")
        })?;
        info!(
            code = response.code,
            result = %response.result,
            action = %resolved.action,
            channel_id = route.channel_id,
            "midjourney submission answered"
        );

        let now = crate::now_millis();
        let mut task = MjTask {
            id: 0,
            user_id: ctx.user_id,
            mj_id: response.result.clone(),
            action: resolved.action.to_string(),
            code: response.code,
            prompt: mj_req.prompt,
            prompt_en: String::new(),
            description: response.description.clone(),
            state: String::new(),
            submit_time: now,
            start_time: 0,
            finish_time: 0,
            image_url: String::new(),
            status: String::new(),
            progress: "0%".to_owned(),
            fail_reason: String::new(),
            channel_id: route.channel_id,
            quota: quote.quota,
            buttons: String::new(),
            properties: String::new(),
        };
        let outcome = normalize_response(&mut response, &mut task, now);
        let body = if outcome.rewritten {
            rewrite_code(&reply.body, response.code)?
        } else {
            reply.body
        };

        let id = self.store.insert_task(&task).await.map_err(|e| {
            error!(error = %e, mj_id = %task.mj_id, "failed to insert midjourney task");
            RelayError::Persistence("insert_midjourney_task_failed")
        })?;
        task.id = id;

        let billing = (outcome.chargeable && quote.chargeable).then(|| BillingHook {
            user_id: ctx.user_id,
            token_id: ctx.token_id,
            token_name: ctx.token_name.clone(),
            channel_id: route.channel_id,
            model_name,
            action: resolved.action,
            quote,
        });

        Ok(Submission {
            status: reply.status,
            headers: forwardable_headers(&reply.headers),
            body,
            task,
            billing,
        })
    }

    /// Commit a hook returned by [`SubmissionEngine::submit`].
    pub async fn commit_billing(&self, hook: BillingHook) {
        hook.commit(self.store.as_ref(), &self.quota_cache).await;
    }
}

/// Interpret the backend code, backfilling `task` and rewriting duplicate
/// codes to [`CODE_SUBMITTED`] so a duplicate looks like a fresh acceptance.
pub fn normalize_response(
    response: &mut MidjourneyResponse,
    task: &mut MjTask,
    now_ms: i64,
) -> Normalized {
    let outcome = match response.code {
        CODE_SUBMITTED => Normalized {
            chargeable: true,
            rewritten: false,
        },
        CODE_EXISTED => {
            if let Some(SubmitProperties::Existing {
                status, image_url, ..
            }) = &response.properties
            {
                task.image_url = image_url.clone();
                task.status = status.clone();
                if status == STATUS_SUCCESS {
                    task.progress = "100%".to_owned();
                    task.start_time = now_ms;
                    task.finish_time = now_ms;
                }
            }
            info!(mj_id = %response.result, "backend reported existing task; normalizing code");
            response.code = CODE_SUBMITTED;
            Normalized {
                chargeable: true,
                rewritten: true,
            }
        }
        CODE_QUEUED => {
            info!(mj_id = %response.result, "backend reported queued task; normalizing code");
            response.code = CODE_SUBMITTED;
            Normalized {
                chargeable: true,
                rewritten: true,
            }
        }
        _ => {
            task.fail_reason = response.description.clone();
            Normalized {
                chargeable: false,
                rewritten: false,
            }
        }
    };
    task.code = response.code;
    outcome
}

/// Replace `code` in the backend body, keeping every other key it sent.
fn rewrite_code(raw: &[u8], code: i64) -> Result<Bytes, RelayError> {
    let mut value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|_| RelayError::Upstream("unmarshal_response_body_failed"))?;
    let Some(fields) = value.as_object_mut() else {
        return Err(RelayError::Upstream("unmarshal_response_body_failed"));
    };
    fields.insert("code".to_owned(), code.into());
    serde_json::to_vec(&value)
        .map(Bytes::from)
        .map_err(|_| RelayError::Upstream("marshal_response_body_failed"))
}

/// Model name to bill and whether the channel remapped it.
fn map_model_name(mapping: Option<&str>) -> Result<(String, bool), RelayError> {
    let Some(raw) = mapping.filter(|m| !m.trim().is_empty()) else {
        return Ok((IMAGE_MODEL.to_owned(), false));
    };
    let map: HashMap<String, String> = serde_json::from_str(raw)
        .map_err(|_| RelayError::Precondition("unmarshal_model_mapping_failed"))?;
    match map.get(IMAGE_MODEL).filter(|m| !m.is_empty()) {
        Some(mapped) => Ok((mapped.clone(), true)),
        None => Ok((IMAGE_MODEL.to_owned(), false)),
    }
}

/// Backend headers minus the ones that describe the original framing.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in [CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION] {
        out.remove(name);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{ChannelRecord, SqliteStore, TokenRecord, TokenStore, UserRecord};
    use crate::routing::CHANNEL_TYPE_MIDJOURNEY;
    use httpmock::prelude::*;
    use http::HeaderValue;
    use serde_json::json;
    use std::time::Duration;

    const BALANCE: i64 = 1_000_000;

    struct Fixture {
        engine: SubmissionEngine<SqliteStore>,
        store: Arc<SqliteStore>,
        ctx: RelayContext,
    }

    async fn add_channel(store: &SqliteStore, base_url: &str, model_mapping: Option<&str>) -> i64 {
        store
            .insert_channel(&ChannelRecord {
                channel_type: CHANNEL_TYPE_MIDJOURNEY,
                name: "mj".into(),
                key: "sk-channel".into(),
                base_url: Some(base_url.into()),
                model_mapping: model_mapping.map(str::to_owned),
                group: "default".into(),
                status: 1,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn fixture(server: &MockServer, balance: i64) -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let user_id = store
            .insert_user(&UserRecord {
                username: "alice".into(),
                group: "default".into(),
                quota: balance,
                status: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        let token_id = store
            .insert_token(&TokenRecord {
                user_id,
                key: "sk-alice".into(),
                name: "default".into(),
                status: 1,
                remain_quota: balance,
                ..Default::default()
            })
            .await
            .unwrap();
        let channel_id = add_channel(&store, &server.base_url(), None).await;

        let engine = SubmissionEngine::new(
            Arc::clone(&store),
            Arc::new(RelaySettings::default()),
            MjBackendClient::new(Duration::from_secs(5)).unwrap(),
        );
        let ctx = RelayContext {
            user_id,
            token_id,
            token_name: "default".into(),
            group: "default".into(),
            channel_id,
            channel_type: CHANNEL_TYPE_MIDJOURNEY,
            base_url: Some(server.base_url()),
            model_mapping: None,
        };
        Fixture { engine, store, ctx }
    }

    fn submit_request(mode: RelayMode, body: serde_json::Value) -> SubmitRequest {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer sk-channel"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        SubmitRequest {
            mode,
            method: http::Method::POST,
            path_and_query: format!("/mj/submit/{mode}"),
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    async fn seed_origin(store: &SqliteStore, user_id: i64, channel_id: i64, status: &str) {
        store
            .insert_task(&MjTask {
                user_id,
                mj_id: "T1".into(),
                action: "IMAGINE".into(),
                code: 1,
                prompt: "origin prompt".into(),
                status: status.into(),
                progress: "100%".into(),
                channel_id,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn accepted_imagine_is_persisted_and_billed() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/mj/submit/imagine")
                .header("mj-api-secret", "sk-channel");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"code": 1, "description": "ok", "result": "T1"}));
        });
        let fx = fixture(&server, BALANCE).await;

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap();
        mock.assert_calls(1);
        assert_eq!(submission.status, StatusCode::OK);
        assert_eq!(submission.headers.get("content-type").unwrap(), "application/json");

        let stored = fx.store.find_task(fx.ctx.user_id, "T1").await.unwrap().unwrap();
        assert_eq!(stored.action, "IMAGINE");
        assert_eq!(stored.code, 1);
        assert_eq!(stored.progress, "0%");
        assert_eq!(stored.prompt, "a cat");
        assert_eq!(stored.channel_id, fx.ctx.channel_id);
        assert_eq!(stored.quota, 50_000);
        assert!(stored.submit_time > 0);

        let hook = submission.billing.expect("chargeable");
        fx.engine.commit_billing(hook).await;
        assert_eq!(fx.store.user_quota(fx.ctx.user_id).await.unwrap(), BALANCE - 50_000);
        let user = fx.store.get_user(fx.ctx.user_id).await.unwrap().unwrap();
        assert_eq!(user.used_quota, 50_000);
        assert_eq!(user.request_count, 1);
    }

    #[tokio::test]
    async fn existing_finished_task_is_normalized_to_accepted() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(200).body(
                r#"{"code":21,"description":"task exists","result":"T1","properties":{"status":"SUCCESS","imageUrl":"https://x/y.png"}}"#,
            );
        });
        let fx = fixture(&server, BALANCE).await;

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap();

        let body = String::from_utf8(submission.body.to_vec()).unwrap();
        assert!(body.contains(r#""code":1"#), "{body}");
        assert!(!body.contains(r#""code":21"#), "{body}");
        let forwarded: MidjourneyResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(forwarded.description, "task exists");
        assert_eq!(forwarded.result, "T1");

        let stored = fx.store.find_task(fx.ctx.user_id, "T1").await.unwrap().unwrap();
        assert_eq!(stored.code, 1);
        assert_eq!(stored.status, "SUCCESS");
        assert_eq!(stored.progress, "100%");
        assert_eq!(stored.image_url, "https://x/y.png");
        assert!(stored.start_time > 0);
        assert!(stored.finish_time > 0);
        assert!(submission.billing.is_some());
    }

    #[tokio::test]
    async fn queued_duplicate_is_rewritten_without_backfill() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(200).body(
                r#"{"code":22,"description":"queued","result":"T2","properties":{"numberOfQueues":1,"discordInstanceId":"111"}}"#,
            );
        });
        let fx = fixture(&server, BALANCE).await;

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap();

        let forwarded: serde_json::Value = serde_json::from_slice(&submission.body).unwrap();
        assert_eq!(forwarded["code"], 1);
        assert_eq!(forwarded["properties"]["numberOfQueues"], 1);
        let stored = fx.store.find_task(fx.ctx.user_id, "T2").await.unwrap().unwrap();
        assert_eq!(stored.code, 1);
        assert_eq!(stored.status, "");
        assert_eq!(stored.progress, "0%");
        assert!(submission.billing.is_some());
    }

    #[tokio::test]
    async fn rewritten_body_keeps_fields_it_does_not_model() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(200).body(
                r#"{"code":22,"description":"queued","result":"T2","taskType":"x","properties":{"numberOfQueues":1,"discordInstanceId":"111","discordChannelId":"222"}}"#,
            );
        });
        let fx = fixture(&server, BALANCE).await;

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap();

        let forwarded: serde_json::Value = serde_json::from_slice(&submission.body).unwrap();
        assert_eq!(
            forwarded,
            json!({
                "code": 1,
                "description": "queued",
                "result": "T2",
                "taskType": "x",
                "properties": {"numberOfQueues": 1, "discordInstanceId": "111", "discordChannelId": "222"}
            })
        );
    }

    #[tokio::test]
    async fn existing_task_with_numeric_instance_id_is_backfilled() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(200).body(
                r#"{"code":21,"description":"exists","result":"T1","properties":{"status":"SUCCESS","imageUrl":"https://x/y.png","discordInstanceId":1118138338562560102}}"#,
            );
        });
        let fx = fixture(&server, BALANCE).await;

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap();

        let forwarded: serde_json::Value = serde_json::from_slice(&submission.body).unwrap();
        assert_eq!(forwarded["code"], 1);
        assert_eq!(forwarded["properties"]["discordInstanceId"], 1118138338562560102_u64);
        let stored = fx.store.find_task(fx.ctx.user_id, "T1").await.unwrap().unwrap();
        assert_eq!(stored.status, "SUCCESS");
        assert_eq!(stored.progress, "100%");
        assert_eq!(stored.image_url, "https://x/y.png");
    }

    #[tokio::test]
    async fn rejected_submission_records_reason_and_skips_billing() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(200).body(
                r#"{"code":23,"description":"queue is full","result":"T3","properties":{"discordInstanceId":"111"}}"#,
            );
        });
        let fx = fixture(&server, BALANCE).await;

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap();

        assert!(submission.billing.is_none());
        let forwarded: serde_json::Value = serde_json::from_slice(&submission.body).unwrap();
        assert_eq!(forwarded["code"], 23);
        let stored = fx.store.find_task(fx.ctx.user_id, "T3").await.unwrap().unwrap();
        assert_eq!(stored.fail_reason, "queue is full");
        assert_eq!(stored.code, 23);
        assert_eq!(fx.store.user_quota(fx.ctx.user_id).await.unwrap(), BALANCE);
    }

    #[tokio::test]
    async fn empty_prompt_never_reaches_backend() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(200).body(r#"{"code":1,"result":"T1"}"#);
        });
        let fx = fixture(&server, BALANCE).await;

        let err = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": ""})))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "prompt_is_required");
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn unaffordable_submission_is_rejected_before_dispatch() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(200).body(r#"{"code":1,"result":"T1"}"#);
        });
        let fx = fixture(&server, 10).await;

        let err = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::QuotaNotEnough));
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn topped_up_balance_is_honoured_after_rejection() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(200).body(r#"{"code":1,"result":"T1"}"#);
        });
        let fx = fixture(&server, 10).await;
        let request = || submit_request(RelayMode::Imagine, json!({"prompt": "a cat"}));

        let err = fx.engine.submit(&fx.ctx, request()).await.unwrap_err();
        assert!(matches!(err, RelayError::QuotaNotEnough));

        fx.store.add_user_quota(fx.ctx.user_id, BALANCE).await.unwrap();
        let submission = fx.engine.submit(&fx.ctx, request()).await.unwrap();
        assert!(submission.billing.is_some());
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn derivative_action_is_pinned_to_origin_channel() {
        let caller_backend = MockServer::start_async().await;
        let origin_backend = MockServer::start_async().await;
        let caller_mock = caller_backend.mock(|when, then| {
            when.method(POST);
            then.status(200).body(r#"{"code":1,"result":"T9"}"#);
        });
        let origin_mock = origin_backend.mock(|when, then| {
            when.method(POST).path("/mj/submit/simple-change");
            then.status(200).body(r#"{"code":1,"result":"T9"}"#);
        });
        let fx = fixture(&caller_backend, BALANCE).await;
        let origin_channel = add_channel(&fx.store, &origin_backend.base_url(), None).await;
        seed_origin(&fx.store, fx.ctx.user_id, origin_channel, STATUS_SUCCESS).await;

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::SimpleChange, json!({"content": "T1 u2"})))
            .await
            .unwrap();

        origin_mock.assert_calls(1);
        caller_mock.assert_calls(0);
        assert_eq!(submission.task.channel_id, origin_channel);
        assert_eq!(submission.task.action, "UPSCALE");
        assert_eq!(submission.task.prompt, "origin prompt");
        assert_eq!(submission.billing.unwrap().channel_id, origin_channel);
    }

    #[tokio::test]
    async fn derivative_of_unfinished_task_fails_unless_modal() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/mj/submit/modal");
            then.status(200).body(r#"{"code":1,"result":"T5"}"#);
        });
        let fx = fixture(&server, BALANCE).await;
        seed_origin(&fx.store, fx.ctx.user_id, fx.ctx.channel_id, "IN_PROGRESS").await;

        let err = fx
            .engine
            .submit(
                &fx.ctx,
                submit_request(RelayMode::Change, json!({"taskId": "T1", "action": "UPSCALE", "index": 1})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "task_status_not_success");

        let submission = fx
            .engine
            .submit(
                &fx.ctx,
                submit_request(RelayMode::Modal, json!({"taskId": "T1", "maskBase64": "AAAA"})),
            )
            .await
            .unwrap();
        mock.assert_calls(1);
        assert_eq!(submission.task.action, "INPAINT");
    }

    #[tokio::test]
    async fn missing_origin_fails_fast() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(200).body(r#"{"code":1,"result":"T1"}"#);
        });
        let fx = fixture(&server, BALANCE).await;

        let err = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::SimpleChange, json!({"content": "nope u1"})))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "task_not_found");
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn inpaint_placeholder_is_not_billed() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/action");
            then.status(200).body(r#"{"code":1,"result":"T6"}"#);
        });
        let fx = fixture(&server, BALANCE).await;
        seed_origin(&fx.store, fx.ctx.user_id, fx.ctx.channel_id, STATUS_SUCCESS).await;

        let submission = fx
            .engine
            .submit(
                &fx.ctx,
                submit_request(RelayMode::Action, json!({"taskId": "T1", "customId": "MJ::Inpaint::1::abc::SOLO"})),
            )
            .await
            .unwrap();
        assert_eq!(submission.task.action, "INPAINT_PRE");
        assert!(submission.billing.is_none());
    }

    #[tokio::test]
    async fn upstream_failure_persists_nothing() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(502).body("bad gateway");
        });
        let fx = fixture(&server, BALANCE).await;

        let err = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "unexpected_response_status");
        assert_eq!(err.code(), crate::error::MJ_ERROR_UNKNOWN);
        assert!(fx.store.find_tasks(fx.ctx.user_id, &["T1".to_owned()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparsable_backend_body_is_upstream_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/mj/submit/imagine");
            then.status(200).body("<html>oops</html>");
        });
        let fx = fixture(&server, BALANCE).await;

        let err = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "unmarshal_response_body_failed");
    }

    #[tokio::test]
    async fn model_mapping_reserializes_resolved_request() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/mj/submit/imagine")
                .body_includes(r#""action":"IMAGINE""#);
            then.status(200).body(r#"{"code":1,"result":"T7"}"#);
        });
        let mut fx = fixture(&server, BALANCE).await;
        fx.ctx.model_mapping = Some(r#"{"midjourney":"mj-fast"}"#.into());

        let submission = fx
            .engine
            .submit(&fx.ctx, submit_request(RelayMode::Imagine, json!({"prompt": "a cat"})))
            .await
            .unwrap();
        mock.assert_calls(1);
        assert_eq!(submission.billing.unwrap().model_name, "mj-fast");
    }

    #[test]
    fn malformed_model_mapping_is_rejected() {
        assert_eq!(
            map_model_name(Some("{not json")).unwrap_err().reason(),
            "unmarshal_model_mapping_failed"
        );
        assert_eq!(map_model_name(None).unwrap(), (IMAGE_MODEL.to_owned(), false));
        assert_eq!(
            map_model_name(Some(r#"{"gpt-4":"x"}"#)).unwrap(),
            (IMAGE_MODEL.to_owned(), false)
        );
    }

    #[test]
    fn normalization_leaves_prompt_text_alone() {
        // A textual code substitution would corrupt this description.
        let mut response = MidjourneyResponse {
            code: CODE_QUEUED,
            description: r#"prompt said "code":22"#.into(),
            properties: None,
            result: "T1".into(),
        };
        let mut task = MjTask::default();
        let outcome = normalize_response(&mut response, &mut task, 1);
        assert!(outcome.rewritten);
        assert_eq!(response.code, CODE_SUBMITTED);
        assert_eq!(response.description, r#"prompt said "code":22"#);
        assert_eq!(task.code, CODE_SUBMITTED);
    }

    #[test]
    fn code_patch_only_touches_the_code_key() {
        let raw = br#"{"code":22,"description":"prompt said \"code\":22","result":"T1","extra":{"code":22}}"#;
        let patched: serde_json::Value = serde_json::from_slice(&rewrite_code(raw, CODE_SUBMITTED).unwrap()).unwrap();
        assert_eq!(patched["code"], 1);
        assert_eq!(patched["description"], r#"prompt said "code":22"#);
        assert_eq!(patched["extra"]["code"], 22);
        assert!(rewrite_code(b"[1,2]", CODE_SUBMITTED).is_err());
    }
}
