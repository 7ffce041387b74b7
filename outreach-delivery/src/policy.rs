//! Retry policy for transient send failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SendError;

/// Bounded retry for transient failures, with exponential backoff.
///
/// Permanent and session errors are never retried; a transient failure is
/// retried until the attempt budget is spent, at which point it is recorded
/// as that contact's final outcome.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts per contact, the first send included.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "defaults::base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "defaults::max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_backoff_secs: defaults::base_backoff_secs(),
            max_backoff_secs: defaults::max_backoff_secs(),
        }
    }
}

impl RetryPolicy {
    /// Whether `error` warrants another attempt after `attempt` tries.
    #[must_use]
    pub const fn should_retry(&self, error: &SendError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Backoff before attempt `attempt + 1`, doubling per failed attempt.
    #[must_use]
    pub const fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let secs = if exp >= 32 {
            self.max_backoff_secs
        } else {
            let scaled = self.base_backoff_secs.saturating_mul(1 << exp);
            if scaled > self.max_backoff_secs {
                self.max_backoff_secs
            } else {
                scaled
            }
        };
        Duration::from_secs(secs)
    }

    #[must_use]
    pub const fn is_final_attempt(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

mod defaults {
    pub(super) const fn max_attempts() -> u32 {
        3
    }

    pub(super) const fn base_backoff_secs() -> u64 {
        2
    }

    pub(super) const fn max_backoff_secs() -> u64 {
        30
    }
}
