use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the claim workflow.
///
/// The `Display` output is the human-readable message shown to the user, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// A local precondition was violated; no collaborator was contacted.
    #[error("{0}")]
    Validation(String),

    /// Authentication was rejected, could not be performed, or is missing.
    #[error("{0}")]
    Auth(String),

    /// The collaborator was reached but reported a failure or returned a malformed payload.
    #[error("{0}")]
    Remote(String),

    /// The same task already has a run in flight.
    #[error("{0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, ClaimError>;

/// Failures reported at the backend boundary, before they are mapped onto [`ClaimError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend answered with a non-success status. `reason` is its `error` field, if any.
    #[error("backend rejected request with status {status}: {}", .reason.as_deref().unwrap_or("<no reason>"))]
    Rejected { status: u16, reason: Option<String> },

    /// The backend could not be reached at all.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with success but the payload did not have the expected shape.
    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// The call did not complete within the configured bound.
    #[error("request timed out after {}", format_limit(.0))]
    TimedOut(Duration),
}

impl BackendError {
    /// Message to surface to the user: the backend's own reason when it gave one,
    /// the timeout notice on expiry, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            BackendError::Rejected {
                reason: Some(reason),
                ..
            } if !reason.trim().is_empty() => reason.clone(),
            BackendError::TimedOut(_) => self.to_string(),
            _ => fallback.to_string(),
        }
    }
}

/// `30s` for whole seconds, `250ms` otherwise.
fn format_limit(limit: &Duration) -> String {
    if limit.subsec_nanos() == 0 {
        format!("{}s", limit.as_secs())
    } else {
        format!("{}ms", limit.as_millis())
    }
}
