//! MailerSend API provider.
//!
//! Sends through `POST {endpoint}/email`; the API answers 202 Accepted with
//! the assigned id in the `x-message-id` response header. The connectivity
//! test reads the account's API quota, which exercises the bearer token
//! without sending anything.

use std::time::Duration;

use async_trait::async_trait;
use outreach_common::{
    config::{MailerSendConfig, SenderConfig},
    contact::Contact,
    template::RenderedEmail,
};
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use tracing::debug;

use super::{EmailProvider, ProviderCapabilities, ProviderKind, SendReceipt};
use crate::error::{SendError, SessionError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct Party<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    from: Party<'a>,
    to: [Party<'a>; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

pub struct MailerSendProvider {
    config: MailerSendConfig,
    sender: SenderConfig,
    /// Authenticated client, created lazily by `authenticate`.
    client: Option<Client>,
}

impl MailerSendProvider {
    #[must_use]
    pub const fn new(config: MailerSendConfig, sender: SenderConfig) -> Self {
        Self {
            config,
            sender,
            client: None,
        }
    }

    fn client(&self) -> Result<&Client, SendError> {
        self.client
            .as_ref()
            .ok_or(SendError::Session(SessionError::NotAuthenticated))
    }
}

#[async_trait]
impl EmailProvider for MailerSendProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::MailerSend
    }

    fn is_configured(&self) -> bool {
        self.config.token().is_some()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: self.kind().name().to_string(),
            max_batch_size: 500,
            // Free-tier API limit; pacing derives its floor from this.
            rate_limit_per_minute: 10,
        }
    }

    async fn authenticate(&mut self) -> Result<(), SendError> {
        let token = self
            .config
            .token()
            .ok_or(SendError::Session(SessionError::NotConfigured))?;

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| SendError::Session(SessionError::AuthRejected(e.to_string())))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| SendError::Session(SessionError::AuthRejected(e.to_string())))?;

        self.client = Some(client);
        debug!(provider = %self.kind(), "api client created");
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), SendError> {
        let client = self.client()?;
        let url = format!("{}/api-quota", self.config.endpoint);
        let response = client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(SendError::from_http_status(status, body))
        }
    }

    async fn send(
        &self,
        contact: &Contact,
        email: &RenderedEmail,
    ) -> Result<SendReceipt, SendError> {
        let client = self.client()?;
        let from_name = self.sender.display_name();
        let request = EmailRequest {
            from: Party {
                email: &self.sender.email,
                name: Some(&from_name),
            },
            to: [Party {
                email: contact.email.as_str(),
                name: contact.display_name.as_deref(),
            }],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let url = format!("{}/email", self.config.endpoint);
        let response = client.post(&url).json(&request).send().await?;

        if response.status() == StatusCode::ACCEPTED {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("accepted")
                .to_string();
            Ok(SendReceipt { message_id })
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(SendError::from_http_status(status, body))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn provider(token: Option<&str>) -> MailerSendProvider {
        MailerSendProvider::new(
            MailerSendConfig {
                api_token: token.map(ToString::to_string),
                endpoint: "https://api.mailersend.invalid/v1".to_string(),
            },
            SenderConfig {
                email: "ops@example.com".to_string(),
                name: Some("Campaign Ops".to_string()),
            },
        )
    }

    #[test]
    fn test_is_configured_requires_token() {
        assert!(provider(Some("token")).is_configured());
        assert!(!provider(None).is_configured());
    }

    #[tokio::test]
    async fn test_send_before_authenticate_is_session_error() {
        let unauthenticated = provider(Some("token"));
        let email = RenderedEmail {
            subject: "s".to_string(),
            html: String::new(),
            text: String::new(),
        };
        let contact = Contact::new(
            outreach_common::address::Address::parse("a@example.com").unwrap(),
            None,
            "Friend",
            ahash::AHashMap::default(),
        );

        let result = unauthenticated.send(&contact, &email).await;
        assert!(matches!(
            result,
            Err(SendError::Session(SessionError::NotAuthenticated))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_without_token_fails() {
        let mut unconfigured = provider(None);
        assert!(matches!(
            unconfigured.authenticate().await,
            Err(SendError::Session(SessionError::NotConfigured))
        ));
    }
}
