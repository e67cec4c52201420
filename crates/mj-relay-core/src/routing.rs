//! Channel routing.
//!
//! Primary actions go to whatever channel the caller was distributed to.
//! Derivative actions are pinned to the channel that created their origin
//! task, because the backend keeps the task's state only on that instance.

use std::collections::HashMap;

use tracing::info;

use crate::action::RelayMode;
use crate::entities::{ChannelStore, MjTask};
use crate::error::RelayError;
use crate::STATUS_SUCCESS;

/// Channel type of a plain Midjourney proxy.
pub const CHANNEL_TYPE_MIDJOURNEY: i32 = 2;
/// Channel type of a Midjourney-plus proxy.
pub const CHANNEL_TYPE_MIDJOURNEY_PLUS: i32 = 27;

/// Per-request caller and channel information, attached by the distribution
/// layer before the engine runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayContext {
    pub user_id: i64,
    pub token_id: i64,
    pub token_name: String,
    pub group: String,
    pub channel_id: i64,
    pub channel_type: i32,
    /// Explicit base URL of the distributed channel, if it has one.
    pub base_url: Option<String>,
    /// Raw model-mapping JSON of the distributed channel.
    pub model_mapping: Option<String>,
}

/// Where a submission is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub base_url: String,
    pub channel_id: i64,
}

/// Route for a primary action: the request-level override, else the default
/// base URL of the caller's channel type.
pub fn primary_route(
    ctx: &RelayContext,
    base_urls: &HashMap<i32, String>,
) -> Result<Route, RelayError> {
    let base_url = ctx
        .base_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .or_else(|| base_urls.get(&ctx.channel_type).map(String::as_str))
        .filter(|u| !u.is_empty())
        .ok_or(RelayError::Precondition("channel_base_url_missing"))?;
    Ok(Route {
        base_url: base_url.to_owned(),
        channel_id: ctx.channel_id,
    })
}

/// Derivative actions need a finished origin task, except the modal in-paint
/// confirmation which may target a task still in progress.
pub fn check_origin_status(mode: RelayMode, origin: &MjTask) -> Result<(), RelayError> {
    if origin.status != STATUS_SUCCESS && mode != RelayMode::Modal {
        return Err(RelayError::Precondition("task_status_not_success"));
    }
    Ok(())
}

/// Route pinned to the channel that owns `origin`.
pub async fn sticky_route<S: ChannelStore>(
    store: &S,
    base_urls: &HashMap<i32, String>,
    origin: &MjTask,
) -> Result<Route, RelayError> {
    let channel = store
        .get_channel(origin.channel_id)
        .await
        .map_err(|_| RelayError::Precondition("get_channel_info_failed"))?
        .ok_or(RelayError::Precondition("get_channel_info_failed"))?;
    let base_url = channel
        .resolved_base_url(base_urls)
        .ok_or(RelayError::Precondition("get_channel_info_failed"))?;
    info!(
        channel_id = origin.channel_id,
        base_url = %base_url,
        origin = %origin.mj_id,
        "derivative action; routing to origin channel"
    );
    Ok(Route {
        base_url,
        channel_id: origin.channel_id,
    })
}
