//! Relay error taxonomy.
//!
//! Every failure of the submission lifecycle ends up as a
//! [`MidjourneyResponse`] envelope.  Request, precondition, quota and
//! persistence failures carry [`MJ_REQUEST_ERROR`]; upstream failures carry
//! [`MJ_ERROR_UNKNOWN`] and never leak backend detail.

use thiserror::Error;
use tracing::error;

use crate::schemas::response::MidjourneyResponse;

/// Envelope code for a rejected request.
pub const MJ_REQUEST_ERROR: i64 = 4;
/// Envelope code for an unclassified upstream failure.
pub const MJ_ERROR_UNKNOWN: i64 = 5;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or incomplete client input.
    #[error("invalid request: {0}")]
    Request(&'static str),

    /// Target task missing, in the wrong state, or its channel is unresolvable.
    #[error("precondition failed: {0}")]
    Precondition(&'static str),

    /// The caller cannot afford the submission.
    #[error("quota_not_enough")]
    QuotaNotEnough,

    /// Transport failure, non-200 status, or an unparsable backend body.
    #[error("upstream error: {0}")]
    Upstream(&'static str),

    /// A repository write failed after the backend already answered.
    #[error("persistence error: {0}")]
    Persistence(&'static str),

    /// A repository read failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RelayError {
    /// Envelope code for this error kind.
    pub fn code(&self) -> i64 {
        match self {
            RelayError::Upstream(_) => MJ_ERROR_UNKNOWN,
            _ => MJ_REQUEST_ERROR,
        }
    }

    /// Machine-readable reason string returned to the caller.
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::Request(r)
            | RelayError::Precondition(r)
            | RelayError::Upstream(r)
            | RelayError::Persistence(r) => r,
            RelayError::QuotaNotEnough => "quota_not_enough",
            RelayError::Database(e) => {
                error!(error = %e, "repository read failed");
                "database_error"
            }
        }
    }

    pub fn to_response(&self) -> MidjourneyResponse {
        MidjourneyResponse::error(self.code(), self.reason())
    }
}
