//! Provider selection and authentication with an ordered fallback chain.
//!
//! Selection order, first success wins:
//! 1. An explicit provider choice is attempted alone; its failure is final.
//! 2. Otherwise the preferred order (or registration order) is walked,
//!    skipping unconfigured backends, authenticating and probing each.
//! 3. A designated default provider is attempted as a last resort.
//! 4. Nothing left: [`AuthenticationError`] listing every attempt.
//!
//! No retries happen here; retry policy lives in the dispatcher.

use std::fmt::{self, Display};

use outreach_common::{
    config::Config,
    contact::Contact,
    template::RenderedEmail,
};
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::provider::{
    EmailProvider, MailerSendProvider, ProviderCapabilities, ProviderKind, SendReceipt,
    SmtpProvider,
};

/// One failed authentication attempt, kept for the final error report.
#[derive(Clone, Debug)]
pub struct AuthAttempt {
    pub provider: ProviderKind,
    pub reason: String,
}

/// No provider could be authenticated.
#[derive(Debug)]
pub struct AuthenticationError {
    pub attempts: Vec<AuthAttempt>,
}

impl Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("no delivery provider is configured");
        }
        f.write_str("no provider could be authenticated:")?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, " {} ({})", attempt.provider, attempt.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for AuthenticationError {}

/// A provider that passed authentication and the connectivity probe.
///
/// This is the terminal `Authenticated` state; the engine never
/// re-authenticates mid-run.
pub struct AuthenticatedProvider {
    provider: Box<dyn EmailProvider>,
    capabilities: ProviderCapabilities,
}

impl fmt::Debug for AuthenticatedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedProvider")
            .field("provider", &self.kind())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl AuthenticatedProvider {
    #[must_use]
    pub fn new(provider: Box<dyn EmailProvider>) -> Self {
        let capabilities = provider.capabilities();
        Self {
            provider,
            capabilities,
        }
    }

    #[must_use]
    pub const fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// Send one rendered email through the authenticated backend.
    ///
    /// # Errors
    /// Propagates the provider's classified [`SendError`].
    pub async fn send(
        &self,
        contact: &Contact,
        email: &RenderedEmail,
    ) -> Result<SendReceipt, SendError> {
        self.provider.send(contact, email).await
    }
}

/// Owns the candidate providers and runs the selection algorithm.
pub struct Authenticator {
    candidates: Vec<Option<Box<dyn EmailProvider>>>,
    default_provider: Option<ProviderKind>,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        providers: Vec<Box<dyn EmailProvider>>,
        default_provider: Option<ProviderKind>,
    ) -> Self {
        Self {
            candidates: providers.into_iter().map(Some).collect(),
            default_provider,
        }
    }

    /// Build the candidate set from configuration, in registration order.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let sender = config.sender.clone();
        let mut providers: Vec<Box<dyn EmailProvider>> = Vec::new();

        if let Some(mailersend) = &config.providers.mailersend {
            providers.push(Box::new(MailerSendProvider::new(
                mailersend.clone(),
                sender.clone(),
            )));
        }
        if let Some(gmail) = &config.providers.gmail {
            providers.push(Box::new(SmtpProvider::gmail(gmail.clone(), sender.clone())));
        }
        if let Some(microsoft) = &config.providers.microsoft {
            providers.push(Box::new(SmtpProvider::microsoft(
                microsoft.clone(),
                sender.clone(),
            )));
        }

        let default_provider = config
            .providers
            .default
            .as_deref()
            .and_then(ProviderKind::from_name);

        Self::new(providers, default_provider)
    }

    /// Resolve and authenticate one provider.
    ///
    /// # Errors
    /// Returns [`AuthenticationError`] carrying every attempted provider and
    /// its failure reason. An explicit choice that fails is returned
    /// immediately without falling back.
    pub async fn select_and_authenticate(
        mut self,
        explicit: Option<ProviderKind>,
        preferred: &[ProviderKind],
    ) -> Result<AuthenticatedProvider, AuthenticationError> {
        let mut attempts = Vec::new();

        // An explicit choice is not a suggestion: try it alone.
        if let Some(kind) = explicit {
            let Some(provider) = self.take(kind) else {
                attempts.push(AuthAttempt {
                    provider: kind,
                    reason: "not configured".to_string(),
                });
                return Err(AuthenticationError { attempts });
            };
            return match authenticate_one(provider).await {
                Ok(authenticated) => Ok(authenticated),
                Err(attempt) => {
                    attempts.push(attempt);
                    Err(AuthenticationError { attempts })
                }
            };
        }

        let order: Vec<ProviderKind> = if preferred.is_empty() {
            self.candidates
                .iter()
                .flatten()
                .map(|provider| provider.kind())
                .collect()
        } else {
            preferred.to_vec()
        };

        for kind in order {
            let Some(provider) = self.take(kind) else {
                continue;
            };
            if !provider.is_configured() {
                debug!(provider = %kind, "skipping unconfigured provider");
                attempts.push(AuthAttempt {
                    provider: kind,
                    reason: "not configured".to_string(),
                });
                continue;
            }
            match authenticate_one(provider).await {
                Ok(authenticated) => return Ok(authenticated),
                Err(attempt) => {
                    warn!(provider = %attempt.provider, reason = %attempt.reason, "provider failed, trying next candidate");
                    attempts.push(attempt);
                }
            }
        }

        // Last resort: the designated default, if it has not been tried yet.
        if let Some(kind) = self.default_provider
            && let Some(provider) = self.take(kind)
            && provider.is_configured()
        {
            match authenticate_one(provider).await {
                Ok(authenticated) => return Ok(authenticated),
                Err(attempt) => attempts.push(attempt),
            }
        }

        Err(AuthenticationError { attempts })
    }

    fn take(&mut self, kind: ProviderKind) -> Option<Box<dyn EmailProvider>> {
        self.candidates
            .iter_mut()
            .find(|slot| {
                slot.as_ref()
                    .is_some_and(|provider| provider.kind() == kind)
            })
            .and_then(Option::take)
    }
}

async fn authenticate_one(
    mut provider: Box<dyn EmailProvider>,
) -> Result<AuthenticatedProvider, AuthAttempt> {
    let kind = provider.kind();
    debug!(provider = %kind, "authenticating");

    if let Err(e) = provider.authenticate().await {
        return Err(AuthAttempt {
            provider: kind,
            reason: e.to_string(),
        });
    }
    if let Err(e) = provider.test_connection().await {
        return Err(AuthAttempt {
            provider: kind,
            reason: format!("connectivity test failed: {e}"),
        });
    }

    info!(provider = %kind, "provider authenticated");
    Ok(AuthenticatedProvider::new(provider))
}
