//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use mj_relay_core::{SqliteStore, SubmissionEngine};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Task, token, channel and quota repositories.
    pub store: Arc<SqliteStore>,
    /// Submission pipeline; shares `store`.
    pub engine: SubmissionEngine<SqliteStore>,
}
