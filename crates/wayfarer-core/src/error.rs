//! Step-level error taxonomy.

use std::time::Duration;
use thiserror::Error;

use crate::page::PageError;

/// Failures local to one step attempt. These are captured into a
/// [`crate::types::StepOutcome`], reported, and mechanically retried; they
/// never unwind past the interpreter boundary.
#[derive(Debug, Error)]
pub enum StepError {
    /// Required payload field missing or malformed. Retrying will not fix
    /// this, but the retry controller does not special-case it.
    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload { action: &'static str, reason: String },

    /// Target selector or text did not resolve. Retryable: the page may
    /// still be loading.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Action kind or host-specific variant not implemented.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// A bounded wait expired.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { waited: Duration, what: String },

    /// Presence or text assertion did not hold.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error(transparent)]
    Page(#[from] PageError),
}

impl StepError {
    pub fn invalid_payload(action: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            action,
            reason: reason.into(),
        }
    }
}
