//! Campaign delivery engine
//!
//! This crate provides the pieces that drive one campaign run:
//! - Provider selection and authentication with an ordered fallback chain
//! - Rate-limited, batched dispatch with per-contact error isolation
//! - Transient/permanent outcome classification with bounded retries
//! - Result aggregation and report publishing

mod authenticator;
mod dispatcher;
mod error;
mod pacing;
mod policy;
pub mod provider;
mod report;
mod run;

pub use authenticator::{AuthAttempt, AuthenticatedProvider, AuthenticationError, Authenticator};
pub use dispatcher::{DispatchOptions, Dispatcher};
pub use error::{PermanentError, SendError, SessionError, TransientError};
pub use pacing::Pacing;
pub use policy::RetryPolicy;
pub use provider::{EmailProvider, ProviderCapabilities, ProviderKind, SendReceipt};
pub use report::{CampaignSummary, FailureDetail, HtmlReportSink, ReportError, ReportSink, summarize};
pub use run::{CampaignRun, ErrorKind, OutcomeStatus, SendOutcome};
