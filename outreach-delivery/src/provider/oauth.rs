//! Client-credentials token fetch for Microsoft 365 SMTP submission.

use outreach_common::config::MicrosoftConfig;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{SendError, SessionError};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Fetch a client-credentials bearer token from the tenant's token endpoint.
///
/// The token is used for one SMTP session established right after this call;
/// the run never refreshes it, so only the secret is kept.
///
/// # Errors
/// Returns [`SendError::Session`] when the identity platform rejects the
/// credentials, or a transient error for network failures.
pub(crate) async fn fetch_token(
    http: &Client,
    config: &MicrosoftConfig,
) -> Result<String, SendError> {
    let secret = config
        .secret()
        .ok_or(SendError::Session(SessionError::NotConfigured))?;

    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", config.client_id.as_str()),
        ("client_secret", secret.as_str()),
        ("scope", config.scope.as_str()),
    ];

    let response = http
        .post(config.token_endpoint())
        .form(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(SendError::Session(SessionError::AuthRejected(format!(
            "{status} {body}"
        ))));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| SendError::Session(SessionError::AuthRejected(e.to_string())))?;

    debug!(expires_in = token.expires_in, "access token acquired");
    Ok(token.access_token)
}
