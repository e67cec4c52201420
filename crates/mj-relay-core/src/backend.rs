//! HTTP client for the Midjourney backend.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::error::RelayError;

/// Header the backend reads its shared secret from.
pub const MJ_API_SECRET: HeaderName = HeaderName::from_static("mj-api-secret");

/// One submission forwarded to the backend.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub url: String,
    pub content_type: Option<HeaderValue>,
    pub accept: Option<HeaderValue>,
    pub secret: String,
    pub body: Bytes,
}

/// The backend's answer, fully read.
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct MjBackendClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl MjBackendClient {
    /// Every [`MjBackendClient::dispatch`] is bounded by `timeout`; dropping
    /// the future cancels the call and releases its connection.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, timeout })
    }

    /// Send `req` once.  Transport and read failures are upstream errors;
    /// status interpretation is left to the caller.
    pub async fn dispatch(&self, req: BackendRequest) -> Result<BackendReply, RelayError> {
        let secret = HeaderValue::from_str(&req.secret)
            .map_err(|_| RelayError::Request("invalid_authorization_header"))?;
        let mut builder = self
            .client
            .request(req.method, &req.url)
            .timeout(self.timeout)
            .header(MJ_API_SECRET, secret)
            .body(req.body);
        if let Some(content_type) = req.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(accept) = req.accept {
            builder = builder.header(ACCEPT, accept);
        }

        debug!(url = %req.url, "dispatching to midjourney backend");
        let resp = builder.send().await.map_err(|e| {
            warn!(url = %req.url, error = %e, "backend request failed");
            RelayError::Upstream("do_request_failed")
        })?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| {
            warn!(error = %e, "failed to read backend response body");
            RelayError::Upstream("read_response_body_failed")
        })?;
        Ok(BackendReply {
            status,
            headers,
            body,
        })
    }

    /// Start downloading a backend-hosted image.
    pub async fn fetch_image(&self, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.client.get(url).send().await
    }
}

/// The credential part of an `Authorization: Bearer <secret>` value.
pub fn bearer_secret(authorization: Option<&HeaderValue>) -> Result<String, RelayError> {
    authorization
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .map(|(_, secret)| secret.trim().to_owned())
        .filter(|s| !s.is_empty())
        .ok_or(RelayError::Request("authorization_is_required"))
}
