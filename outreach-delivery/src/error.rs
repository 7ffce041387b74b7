//! Typed error handling for send attempts.
//!
//! This module distinguishes three failure classes:
//! - Transient failures (rate limits, timeouts, 5xx) - retry with backoff
//! - Permanent failures (invalid recipient, rejected content) - don't retry
//! - Session failures (lost authentication, provider outage) - abort the run

use thiserror::Error;

/// Result of a failed send attempt, classified for retry handling.
#[derive(Debug, Error)]
pub enum SendError {
    /// Permanent failure that should not be retried.
    #[error("permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Transient failure that can be retried with backoff.
    #[error("transient failure: {0}")]
    Transient(#[from] TransientError),

    /// The authenticated session itself is unusable; the run must end.
    #[error("session failure: {0}")]
    Session(#[from] SessionError),
}

/// Failures that will not succeed on retry.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// Recipient address was rejected by the provider.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Message content was rejected (policy, spam, size).
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The provider rejected the API request itself.
    #[error("request rejected: {0}")]
    ApiRejected(String),
}

/// Failures that plausibly succeed on retry.
#[derive(Debug, Error)]
pub enum TransientError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("provider busy: {0}")]
    ServerBusy(String),
}

/// Infrastructure-level failures that end the whole run.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("provider is not configured")]
    NotConfigured,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("authenticated session lost: {0}")]
    SessionLost(String),
}

impl SendError {
    /// Returns `true` if this error should be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` if this error should be recorded without retry.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if this error ends the campaign run.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Classify a non-success HTTP response from a delivery API.
    ///
    /// - 401/403 mean the token stopped working mid-run: session failure
    /// - 408/429 and 5xx are transient
    /// - remaining 4xx are permanent rejections
    #[must_use]
    pub fn from_http_status(status: u16, detail: String) -> Self {
        match status {
            401 | 403 => Self::Session(SessionError::SessionLost(format!("{status} {detail}"))),
            408 => Self::Transient(TransientError::Timeout(format!("{status} {detail}"))),
            429 => Self::Transient(TransientError::RateLimited(format!("{status} {detail}"))),
            500..=599 => Self::Transient(TransientError::ServerBusy(format!("{status} {detail}"))),
            _ => Self::Permanent(PermanentError::ApiRejected(format!("{status} {detail}"))),
        }
    }
}

/// Network-level errors from the HTTP client are transient; a retry may land
/// on a healthy connection.
impl From<reqwest::Error> for SendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transient(TransientError::Timeout(error.to_string()))
        } else {
            Self::Transient(TransientError::ConnectionFailed(error.to_string()))
        }
    }
}

/// SMTP errors are classified by the server's response category: permanent
/// (5xx) rejections are recorded, transient (4xx) failures are retried, and
/// anything else is treated as a connection problem.
impl From<lettre::transport::smtp::Error> for SendError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        if error.is_permanent() {
            Self::Permanent(PermanentError::Rejected(error.to_string()))
        } else if error.is_transient() {
            Self::Transient(TransientError::ServerBusy(error.to_string()))
        } else if error.is_timeout() {
            Self::Transient(TransientError::Timeout(error.to_string()))
        } else {
            Self::Transient(TransientError::ConnectionFailed(error.to_string()))
        }
    }
}

/// Message construction failures (bad mailbox, bad header) cannot succeed on
/// retry.
impl From<lettre::error::Error> for SendError {
    fn from(error: lettre::error::Error) -> Self {
        Self::Permanent(PermanentError::InvalidRecipient(error.to_string()))
    }
}
