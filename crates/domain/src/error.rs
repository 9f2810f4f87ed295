//! Guestbook error taxonomy.
//!
//! A guest who already has a wish is not an error: conditional creates report
//! that through [`CreateOutcome::AlreadyExists`](crate::models::CreateOutcome).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuestbookError {
    /// The guest name normalized to an empty key. Permanent.
    #[error("No identity: the guest name is empty")]
    NoIdentity,

    /// Rejected before reaching the store.
    #[error("Invalid submission: {0}")]
    Invalid(String),

    /// Connectivity or storage failure. The write may or may not have landed.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// The store did not answer within the configured bound.
    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
}

impl GuestbookError {
    /// Whether another attempt may be offered, after re-checking identity state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GuestbookError::Transient(_) | GuestbookError::Timeout(_)
        )
    }

    /// Short machine-readable code for logs and API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            GuestbookError::NoIdentity => "no_identity",
            GuestbookError::Invalid(_) => "invalid",
            GuestbookError::Transient(_) => "transient",
            GuestbookError::Timeout(_) => "timeout",
        }
    }
}
