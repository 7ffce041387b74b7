//! Campaign configuration.
//!
//! Loaded from a TOML file; every optional field carries a serde default so a
//! minimal file only needs the sender address, a subject, and one provider
//! table. Secrets may be omitted from the file and supplied through
//! environment variables instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment fallbacks for secrets kept out of the config file.
pub const ENV_MAILERSEND_API_TOKEN: &str = "OUTREACH_MAILERSEND_API_TOKEN";
pub const ENV_GMAIL_APP_PASSWORD: &str = "OUTREACH_GMAIL_APP_PASSWORD";
pub const ENV_MICROSOFT_CLIENT_SECRET: &str = "OUTREACH_MICROSOFT_CLIENT_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("failed to read template file {path}: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub sender: SenderConfig,

    #[serde(default)]
    pub campaign: CampaignConfig,

    pub template: TemplateConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Read and validate a configuration file.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.campaign.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "campaign.batch_size must be at least 1".to_string(),
            ));
        }
        if self.sender.email.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sender.email must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Address campaigns are sent from.
    pub email: String,

    /// Display name; derived from the address local part when unset.
    #[serde(default)]
    pub name: Option<String>,
}

impl SenderConfig {
    /// The display name, deriving one from the email's local part when none
    /// is configured ("jane.doe@…" becomes "Jane Doe").
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let local = self.email.split('@').next().unwrap_or_default();
        local
            .replace(['.', '_'], " ")
            .split_whitespace()
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Contacts per batch.
    ///
    /// Default: 50
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Delay between two emails inside a batch, in seconds.
    ///
    /// Default: 7 seconds
    #[serde(default = "defaults::inter_email_secs")]
    pub inter_email_secs: u64,

    /// Delay between two batches, in seconds.
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "defaults::inter_batch_secs")]
    pub inter_batch_secs: u64,

    /// First name used when none can be derived for a contact.
    ///
    /// Default: "Friend"
    #[serde(default = "defaults::default_first_name")]
    pub default_first_name: String,

    /// Source columns holding the email address, tried in order.
    #[serde(default = "defaults::email_columns")]
    pub email_columns: Vec<String>,

    /// Source columns holding the contact name, tried in order.
    #[serde(default = "defaults::name_columns")]
    pub name_columns: Vec<String>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            inter_email_secs: defaults::inter_email_secs(),
            inter_batch_secs: defaults::inter_batch_secs(),
            default_first_name: defaults::default_first_name(),
            email_columns: defaults::email_columns(),
            name_columns: defaults::name_columns(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Subject line template.
    pub subject: String,

    /// Inline HTML body template.
    #[serde(default)]
    pub html: Option<String>,

    /// HTML body template file, used when `html` is unset.
    #[serde(default)]
    pub html_path: Option<PathBuf>,

    /// Inline plain-text body template.
    #[serde(default)]
    pub text: Option<String>,

    /// Plain-text body template file, used when `text` is unset.
    #[serde(default)]
    pub text_path: Option<PathBuf>,
}

impl TemplateConfig {
    /// Resolve the HTML and text bodies, reading template files if needed.
    ///
    /// # Errors
    /// Returns [`ConfigError::Template`] when a referenced file cannot be
    /// read.
    pub fn resolve_bodies(&self) -> Result<(String, String), ConfigError> {
        let html = Self::resolve(self.html.as_deref(), self.html_path.as_deref())?;
        let text = Self::resolve(self.text.as_deref(), self.text_path.as_deref())?;
        Ok((html, text))
    }

    fn resolve(inline: Option<&str>, path: Option<&Path>) -> Result<String, ConfigError> {
        if let Some(body) = inline {
            return Ok(body.to_string());
        }
        match path {
            Some(path) => {
                std::fs::read_to_string(path).map_err(|source| ConfigError::Template {
                    path: path.to_path_buf(),
                    source,
                })
            }
            None => Ok(String::new()),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub mailersend: Option<MailerSendConfig>,

    #[serde(default)]
    pub gmail: Option<GmailConfig>,

    #[serde(default)]
    pub microsoft: Option<MicrosoftConfig>,

    /// Fallback chain, tried in order. Empty means registration order.
    #[serde(default)]
    pub preferred: Vec<String>,

    /// Last-resort provider attempted after the fallback chain fails.
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailerSendConfig {
    /// API token; falls back to `OUTREACH_MAILERSEND_API_TOKEN`.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Default: `https://api.mailersend.com/v1`
    #[serde(default = "defaults::mailersend_endpoint")]
    pub endpoint: String,
}

impl MailerSendConfig {
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.api_token
            .clone()
            .or_else(|| std::env::var(ENV_MAILERSEND_API_TOKEN).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Gmail account the campaign is sent from.
    pub sender_email: String,

    /// App password; falls back to `OUTREACH_GMAIL_APP_PASSWORD`.
    #[serde(default)]
    pub app_password: Option<String>,

    /// Default: `smtp.gmail.com`
    #[serde(default = "defaults::gmail_host")]
    pub host: String,

    /// Default: 587
    #[serde(default = "defaults::smtp_port")]
    pub port: u16,
}

impl GmailConfig {
    #[must_use]
    pub fn password(&self) -> Option<String> {
        self.app_password
            .clone()
            .or_else(|| std::env::var(ENV_GMAIL_APP_PASSWORD).ok())
            .filter(|password| !password.trim().is_empty())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MicrosoftConfig {
    pub tenant_id: String,
    pub client_id: String,

    /// Client secret; falls back to `OUTREACH_MICROSOFT_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Mailbox used for SMTP submission; falls back to `sender.email`.
    #[serde(default)]
    pub sender_email: Option<String>,

    /// Default: `smtp.office365.com`
    #[serde(default = "defaults::microsoft_host")]
    pub host: String,

    /// Default: 587
    #[serde(default = "defaults::smtp_port")]
    pub port: u16,

    /// Default: `https://outlook.office365.com/.default`
    #[serde(default = "defaults::microsoft_scope")]
    pub scope: String,
}

impl MicrosoftConfig {
    #[must_use]
    pub fn secret(&self) -> Option<String> {
        self.client_secret
            .clone()
            .or_else(|| std::env::var(ENV_MICROSOFT_CLIENT_SECRET).ok())
            .filter(|secret| !secret.trim().is_empty())
    }

    /// OAuth token endpoint for the configured tenant.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory the run report is written to.
    ///
    /// Default: `logs`
    #[serde(default = "defaults::report_dir")]
    pub dir: PathBuf,

    /// Title shown at the top of the report.
    ///
    /// Default: "Email Campaign Summary"
    #[serde(default = "defaults::report_title")]
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: defaults::report_dir(),
            title: defaults::report_title(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub const fn batch_size() -> usize {
        50
    }

    pub const fn inter_email_secs() -> u64 {
        7
    }

    pub const fn inter_batch_secs() -> u64 {
        300 // 5 minutes
    }

    pub fn default_first_name() -> String {
        "Friend".to_string()
    }

    pub fn email_columns() -> Vec<String> {
        vec!["email".to_string()]
    }

    pub fn name_columns() -> Vec<String> {
        vec!["name".to_string()]
    }

    pub fn mailersend_endpoint() -> String {
        "https://api.mailersend.com/v1".to_string()
    }

    pub fn gmail_host() -> String {
        "smtp.gmail.com".to_string()
    }

    pub fn microsoft_host() -> String {
        "smtp.office365.com".to_string()
    }

    pub const fn smtp_port() -> u16 {
        587
    }

    pub fn microsoft_scope() -> String {
        "https://outlook.office365.com/.default".to_string()
    }

    pub fn report_dir() -> PathBuf {
        PathBuf::from("logs")
    }

    pub fn report_title() -> String {
        "Email Campaign Summary".to_string()
    }
}
