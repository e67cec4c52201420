//! Caller authentication and channel distribution.
//!
//! [`distribute`] turns `Authorization: Bearer <token>` into a
//! [`RelayContext`] request extension and swaps the header for the selected
//! channel's key, which the engine forwards to the backend.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use mj_relay_core::backend::MJ_API_SECRET;
use mj_relay_core::entities::{ChannelStore, TokenStore, TOKEN_STATUS_ENABLED, USER_STATUS_ENABLED};
use mj_relay_core::routing::{CHANNEL_TYPE_MIDJOURNEY, CHANNEL_TYPE_MIDJOURNEY_PLUS};
use mj_relay_core::RelayContext;
use tracing::debug;

use crate::error::ServerError;
use crate::state::AppState;

pub async fn distribute(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let key = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::Unauthorized("missing bearer token".into()))?;

    let token = state
        .store
        .find_token_by_key(&key)
        .await?
        .filter(|t| t.status == TOKEN_STATUS_ENABLED)
        .ok_or_else(|| ServerError::Unauthorized("invalid token".into()))?;
    let user = state
        .store
        .get_user(token.user_id)
        .await?
        .filter(|u| u.status == USER_STATUS_ENABLED)
        .ok_or_else(|| ServerError::Unauthorized("user is disabled".into()))?;

    let channel = state
        .store
        .pick_channel(
            &user.group,
            &[CHANNEL_TYPE_MIDJOURNEY, CHANNEL_TYPE_MIDJOURNEY_PLUS],
        )
        .await?
        .ok_or_else(|| {
            ServerError::Unavailable(format!(
                "no available midjourney channel for group {}",
                user.group
            ))
        })?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", channel.key))
        .map_err(|_| ServerError::Internal(format!("channel {} key is not a valid header", channel.id)))?;
    debug!(user_id = user.id, channel_id = channel.id, "request distributed");

    req.headers_mut().insert(AUTHORIZATION, bearer);
    req.extensions_mut().insert(RelayContext {
        user_id: user.id,
        token_id: token.id,
        token_name: token.name,
        group: user.group,
        channel_id: channel.id,
        channel_type: channel.channel_type,
        base_url: channel.base_url,
        model_mapping: channel.model_mapping,
    });
    Ok(next.run(req).await)
}

/// Require the configured notify secret in the `mj-api-secret` header.
pub async fn check_notify_secret(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(expected) = &state.config.notify_secret {
        let provided = req
            .headers()
            .get(&MJ_API_SECRET)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return ServerError::Unauthorized("unauthorised".into()).into_response();
        }
    }
    next.run(req).await
}
