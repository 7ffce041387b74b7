//! Per-contact outcomes and the record of one campaign run.

use chrono::{DateTime, Utc};
use outreach_common::address::Address;
use serde::{Deserialize, Serialize};

use crate::error::SendError;
use crate::provider::ProviderKind;

/// Coarse failure class carried into reports.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The template could not be rendered for this contact; nothing was sent.
    Render,
    /// Retries were exhausted on a transient failure.
    Transient,
    /// The provider rejected the recipient or the message.
    Permanent,
    /// The run ended before or during this contact's send.
    Aborted,
}

impl ErrorKind {
    #[must_use]
    pub fn of(error: &SendError) -> Self {
        match error {
            SendError::Transient(_) => Self::Transient,
            SendError::Permanent(_) => Self::Permanent,
            // A session loss ends the run; the triggering contact carries
            // the error detail.
            SendError::Session(_) => Self::Aborted,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Aborted => "aborted",
        }
    }
}

/// Terminal state of one contact: accepted with a provider receipt, or
/// failed with a classified reason. Never both, never neither.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OutcomeStatus {
    Accepted { message_id: String },
    Failed { kind: ErrorKind, detail: String },
}

impl OutcomeStatus {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// One contact's final record in the run.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SendOutcome {
    pub email: Address,
    pub display_name: Option<String>,
    /// Send attempts made, zero for contacts never attempted.
    pub attempts: u32,
    pub status: OutcomeStatus,
    pub completed_at: DateTime<Utc>,
}

impl SendOutcome {
    #[must_use]
    pub fn accepted(email: Address, display_name: Option<String>, attempts: u32, message_id: String) -> Self {
        Self {
            email,
            display_name,
            attempts,
            status: OutcomeStatus::Accepted { message_id },
            completed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(
        email: Address,
        display_name: Option<String>,
        attempts: u32,
        kind: ErrorKind,
        detail: String,
    ) -> Self {
        Self {
            email,
            display_name,
            attempts,
            status: OutcomeStatus::Failed { kind, detail },
            completed_at: Utc::now(),
        }
    }
}

/// The complete record of one dispatch pass over a contact list.
///
/// Every planned contact appears exactly once in `outcomes`, in input
/// order, whether the run finished, aborted, or was cancelled.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CampaignRun {
    pub provider: ProviderKind,
    /// Contacts planned; equals `outcomes.len()` at terminal states.
    pub total_contacts: usize,
    /// Batches the plan was divided into.
    pub batches_planned: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<SendOutcome>,
    /// Set when a session failure or cancellation ended the run early.
    pub aborted: bool,
}

impl CampaignRun {
    #[must_use]
    pub fn sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status.is_accepted())
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.sent()
    }

    #[must_use]
    pub fn failures_of(&self, kind: ErrorKind) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| {
                matches!(&outcome.status, OutcomeStatus::Failed { kind: k, .. } if *k == kind)
            })
            .count()
    }
}
