//! SMTP providers built on lettre.
//!
//! One implementation covers both SMTP-backed providers: Gmail submission
//! with an app password (LOGIN) and Microsoft 365 submission with a
//! client-credentials OAuth token (XOAUTH2). The STARTTLS transport is
//! created lazily by `authenticate` and reused for the whole run.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::{Credentials, Mechanism},
};
use outreach_common::{
    config::{GmailConfig, MicrosoftConfig, SenderConfig},
    contact::Contact,
    template::RenderedEmail,
};
use tracing::debug;

use super::{EmailProvider, ProviderCapabilities, ProviderKind, SendReceipt, oauth};
use crate::error::{PermanentError, SendError, SessionError};

enum SmtpAuth {
    AppPassword(GmailConfig),
    OAuth2(MicrosoftConfig),
}

pub struct SmtpProvider {
    kind: ProviderKind,
    auth: SmtpAuth,
    sender: SenderConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpProvider {
    /// Gmail submission with an app password.
    #[must_use]
    pub const fn gmail(config: GmailConfig, sender: SenderConfig) -> Self {
        Self {
            kind: ProviderKind::GmailSmtp,
            auth: SmtpAuth::AppPassword(config),
            sender,
            transport: None,
        }
    }

    /// Microsoft 365 submission with client-credentials OAuth.
    #[must_use]
    pub const fn microsoft(config: MicrosoftConfig, sender: SenderConfig) -> Self {
        Self {
            kind: ProviderKind::MicrosoftOauth,
            auth: SmtpAuth::OAuth2(config),
            sender,
            transport: None,
        }
    }

    fn transport(&self) -> Result<&AsyncSmtpTransport<Tokio1Executor>, SendError> {
        self.transport
            .as_ref()
            .ok_or(SendError::Session(SessionError::NotAuthenticated))
    }

    /// The mailbox the SMTP session submits as.
    fn submission_address(&self) -> &str {
        match &self.auth {
            SmtpAuth::AppPassword(gmail) => &gmail.sender_email,
            SmtpAuth::OAuth2(microsoft) => microsoft
                .sender_email
                .as_deref()
                .unwrap_or(&self.sender.email),
        }
    }

    fn from_mailbox(&self) -> Result<Mailbox, SendError> {
        format!("{} <{}>", self.sender.display_name(), self.submission_address())
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                SendError::Session(SessionError::AuthRejected(format!(
                    "invalid sender address: {e}"
                )))
            })
    }

    fn to_mailbox(contact: &Contact) -> Result<Mailbox, SendError> {
        let raw = contact.display_name.as_ref().map_or_else(
            || contact.email.to_string(),
            |name| format!("{name} <{}>", contact.email),
        );
        raw.parse().map_err(|e: lettre::address::AddressError| {
            SendError::Permanent(PermanentError::InvalidRecipient(format!(
                "{}: {e}",
                contact.email
            )))
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        match &self.auth {
            SmtpAuth::AppPassword(gmail) => {
                !gmail.sender_email.trim().is_empty() && gmail.password().is_some()
            }
            SmtpAuth::OAuth2(microsoft) => {
                !microsoft.tenant_id.trim().is_empty()
                    && !microsoft.client_id.trim().is_empty()
                    && microsoft.secret().is_some()
            }
        }
    }

    fn capabilities(&self) -> ProviderCapabilities {
        let rate_limit_per_minute = match self.kind {
            ProviderKind::GmailSmtp => 20,
            _ => 30,
        };
        ProviderCapabilities {
            name: self.kind.name().to_string(),
            max_batch_size: 100,
            rate_limit_per_minute,
        }
    }

    async fn authenticate(&mut self) -> Result<(), SendError> {
        let (host, port, credentials, mechanism) = match &self.auth {
            SmtpAuth::AppPassword(gmail) => {
                let password = gmail
                    .password()
                    .ok_or(SendError::Session(SessionError::NotConfigured))?;
                (
                    gmail.host.clone(),
                    gmail.port,
                    Credentials::new(gmail.sender_email.clone(), password),
                    Mechanism::Login,
                )
            }
            SmtpAuth::OAuth2(microsoft) => {
                let http = reqwest::Client::new();
                let token = oauth::fetch_token(&http, microsoft).await?;
                (
                    microsoft.host.clone(),
                    microsoft.port,
                    Credentials::new(self.submission_address().to_string(), token),
                    Mechanism::Xoauth2,
                )
            }
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
            .map_err(|e| SendError::Session(SessionError::AuthRejected(e.to_string())))?
            .port(port)
            .credentials(credentials)
            .authentication(vec![mechanism])
            .build();

        self.transport = Some(transport);
        debug!(provider = %self.kind, host, port, "smtp transport created");
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), SendError> {
        let transport = self.transport()?;
        match transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::Session(SessionError::AuthRejected(
                "server rejected the smtp session".to_string(),
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn send(
        &self,
        contact: &Contact,
        email: &RenderedEmail,
    ) -> Result<SendReceipt, SendError> {
        let transport = self.transport()?;

        let message = Message::builder()
            .from(self.from_mailbox()?)
            .to(Self::to_mailbox(contact)?)
            .subject(&email.subject)
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))?;

        let response = transport.send(message).await?;

        // SMTP has no message id of its own; keep the server's acceptance
        // line as the receipt.
        let message_id = response.message().collect::<Vec<_>>().join(" ");
        Ok(SendReceipt {
            message_id: if message_id.is_empty() {
                "accepted".to_string()
            } else {
                message_id
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ahash::AHashMap;
    use outreach_common::address::Address;

    fn sender() -> SenderConfig {
        SenderConfig {
            email: "ops@example.com".to_string(),
            name: Some("Campaign Ops".to_string()),
        }
    }

    fn gmail_config(password: Option<&str>) -> GmailConfig {
        GmailConfig {
            sender_email: "ops@gmail.com".to_string(),
            app_password: password.map(ToString::to_string),
            host: "smtp.gmail.com".to_string(),
            port: 587,
        }
    }

    #[test]
    fn test_gmail_is_configured() {
        assert!(SmtpProvider::gmail(gmail_config(Some("pw")), sender()).is_configured());
        assert!(!SmtpProvider::gmail(gmail_config(None), sender()).is_configured());
    }

    #[test]
    fn test_microsoft_is_configured_requires_secret() {
        let config = MicrosoftConfig {
            tenant_id: "tid".to_string(),
            client_id: "cid".to_string(),
            client_secret: None,
            sender_email: None,
            host: "smtp.office365.com".to_string(),
            port: 587,
            scope: "https://outlook.office365.com/.default".to_string(),
        };
        assert!(!SmtpProvider::microsoft(config, sender()).is_configured());
    }

    #[test]
    fn test_submission_address_fallback() {
        let microsoft = MicrosoftConfig {
            tenant_id: "tid".to_string(),
            client_id: "cid".to_string(),
            client_secret: Some("secret".to_string()),
            sender_email: None,
            host: "smtp.office365.com".to_string(),
            port: 587,
            scope: "https://outlook.office365.com/.default".to_string(),
        };
        let provider = SmtpProvider::microsoft(microsoft, sender());
        assert_eq!(provider.submission_address(), "ops@example.com");
    }

    #[tokio::test]
    async fn test_send_before_authenticate_is_session_error() {
        let provider = SmtpProvider::gmail(gmail_config(Some("pw")), sender());
        let contact = Contact::new(
            Address::parse("a@example.com").unwrap(),
            None,
            "Friend",
            AHashMap::default(),
        );
        let email = RenderedEmail {
            subject: "s".to_string(),
            html: "<p>h</p>".to_string(),
            text: "t".to_string(),
        };

        assert!(matches!(
            provider.send(&contact, &email).await,
            Err(SendError::Session(SessionError::NotAuthenticated))
        ));
    }
}
