//! Email delivery providers.
//!
//! Providers form a closed set ([`ProviderKind`]) behind one capability
//! interface ([`EmailProvider`]). The authenticator picks one through the
//! ordered fallback chain; the dispatcher only ever talks to the trait.

mod mailersend;
mod oauth;
mod smtp;

use std::fmt::{self, Display};

use async_trait::async_trait;
use outreach_common::{contact::Contact, template::RenderedEmail};
use serde::{Deserialize, Serialize};

pub use mailersend::MailerSendProvider;
pub use smtp::SmtpProvider;

use crate::error::SendError;

/// The closed set of delivery backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    MailerSend,
    GmailSmtp,
    MicrosoftOauth,
}

impl ProviderKind {
    /// Registration order, also the default fallback order.
    pub const ALL: [Self; 3] = [Self::MailerSend, Self::GmailSmtp, Self::MicrosoftOauth];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MailerSend => "mailersend",
            Self::GmailSmtp => "gmail_smtp",
            Self::MicrosoftOauth => "microsoft_oauth",
        }
    }

    /// Parse a provider name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one delivery backend offers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub name: String,
    /// Largest batch the provider will accept.
    pub max_batch_size: usize,
    /// Sustained send rate the provider allows.
    pub rate_limit_per_minute: u32,
}

/// Proof that a provider accepted one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider-assigned message identifier.
    pub message_id: String,
}

/// Uniform send capability over one delivery backend.
///
/// Authentication follows `Unauthenticated -> Authenticating ->
/// {Authenticated | Failed}`; a provider that has not successfully
/// authenticated answers [`SendError::Session`] from [`EmailProvider::send`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether credentials for this backend are present.
    fn is_configured(&self) -> bool;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Authenticate and lazily create the underlying client.
    ///
    /// # Errors
    /// Returns [`SendError`] when credentials are missing or rejected.
    async fn authenticate(&mut self) -> Result<(), SendError>;

    /// Lightweight connectivity check against the authenticated backend.
    ///
    /// # Errors
    /// Returns [`SendError`] when the backend is unreachable or the session
    /// is unusable.
    async fn test_connection(&self) -> Result<(), SendError>;

    /// Send one rendered email to one contact.
    ///
    /// # Errors
    /// Returns a classified [`SendError`]; the caller decides whether to
    /// retry, record, or abort.
    async fn send(
        &self,
        contact: &Contact,
        email: &RenderedEmail,
    ) -> Result<SendReceipt, SendError>;
}
