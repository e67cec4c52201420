//! mj-relay-core – task-submission protocol for the Midjourney relay.
//!
//! A client submission flows through:
//! 1. [`action`] – decode the raw request into a canonical action.
//! 2. [`routing`] – pick the backend instance (sticky for derivative actions).
//! 3. [`pricing`] – compute the quota charge and pre-check the balance.
//! 4. [`engine`] – dispatch, normalize duplicate codes, persist the task and
//!    hand back a deferred [`engine::BillingHook`].
//!
//! [`notify`] and [`projection`] read and write the same task rows from the
//! backend's push channel and the client's polling side respectively.

pub mod action;
pub mod backend;
pub mod engine;
pub mod entities;
pub mod error;
pub mod notify;
pub mod pricing;
pub mod projection;
pub mod routing;
pub mod schemas;
pub mod settings;

pub use action::{Action, RelayMode, ResolvedAction};
pub use backend::MjBackendClient;
pub use engine::{BillingHook, SubmitRequest, Submission, SubmissionEngine};
pub use entities::SqliteStore;
pub use error::RelayError;
pub use routing::RelayContext;
pub use settings::RelaySettings;

/// Backend status string marking a finished task.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
