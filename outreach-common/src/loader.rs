//! Contact ingestion and per-row validation.
//!
//! The loader consumes an abstract tabular source (rows of string key→value
//! pairs) and turns each row into a [`Contact`]. A row with a missing or
//! invalid email is skipped and reported as a [`LoadError`]; a few bad rows
//! must never block an entire campaign, so [`load`] never fails as a whole.
//!
//! Duplicate emails are preserved as separate contacts; deduplication is left
//! to the caller.

use std::path::Path;

use ahash::AHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::address::{Address, AddressError};
use crate::contact::Contact;

/// One row of the tabular source.
pub type Record = AHashMap<String, String>;

/// How the loader maps source columns onto contact fields.
#[derive(Clone, Debug)]
pub struct LoaderOptions {
    /// Column names (case-insensitive) tried, in order, for the email field.
    pub email_columns: Vec<String>,
    /// Column names (case-insensitive) tried, in order, for the display name.
    pub name_columns: Vec<String>,
    /// First name used when nothing can be derived from the display name.
    pub default_first_name: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            email_columns: vec!["email".to_string()],
            name_columns: vec!["name".to_string()],
            default_first_name: "Friend".to_string(),
        }
    }
}

/// A source row that could not be turned into a contact.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("row {row}: {reason}")]
pub struct LoadError {
    /// Zero-based index of the offending row.
    pub row: usize,
    pub reason: LoadErrorReason,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoadErrorReason {
    #[error("no email column found")]
    MissingEmail,

    #[error("invalid email address: {0}")]
    InvalidEmail(#[from] AddressError),
}

/// Load and validate contacts from source rows.
///
/// Returns every valid contact, in source order, along with one [`LoadError`]
/// per rejected row. An empty source yields an empty contact list, not an
/// error.
#[must_use]
pub fn load<I>(rows: I, options: &LoaderOptions) -> (Vec<Contact>, Vec<LoadError>)
where
    I: IntoIterator<Item = Record>,
{
    let mut contacts = Vec::new();
    let mut errors = Vec::new();

    for (row, record) in rows.into_iter().enumerate() {
        match contact_from_record(&record, options) {
            Ok(contact) => contacts.push(contact),
            Err(reason) => {
                warn!(row, %reason, "skipping contact row");
                errors.push(LoadError { row, reason });
            }
        }
    }

    debug!(
        loaded = contacts.len(),
        rejected = errors.len(),
        "contact load complete"
    );
    (contacts, errors)
}

fn contact_from_record(
    record: &Record,
    options: &LoaderOptions,
) -> Result<Contact, LoadErrorReason> {
    let raw_email =
        lookup(record, &options.email_columns).ok_or(LoadErrorReason::MissingEmail)?;
    if raw_email.trim().is_empty() {
        return Err(LoadErrorReason::MissingEmail);
    }
    let email = Address::parse(raw_email)?;

    let display_name = lookup(record, &options.name_columns)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string);

    // Every source column passes through as personalization context.
    let fields = record.clone();

    Ok(Contact::new(
        email,
        display_name,
        &options.default_first_name,
        fields,
    ))
}

/// Case-insensitive column lookup, first candidate wins.
fn lookup<'a>(record: &'a Record, candidates: &[String]) -> Option<&'a str> {
    candidates.iter().find_map(|candidate| {
        record
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(candidate))
            .map(|(_, value)| value.as_str())
    })
}

/// Failure to read or parse a contact file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read contact file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed contact file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Rows parsed from a JSON file holding an array of flat objects.
///
/// Non-string scalar values are stringified so that numeric columns still
/// pass through as personalization context.
#[derive(Clone, Debug, Default)]
pub struct JsonRecords(Vec<Record>);

impl JsonRecords {
    /// Parse records from a JSON string.
    ///
    /// # Errors
    /// Returns [`SourceError::Parse`] when the input is not an array of
    /// objects.
    pub fn from_str(data: &str) -> Result<Self, SourceError> {
        let raw: Vec<AHashMap<String, Value>> = serde_json::from_str(data)?;
        let records = raw
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(key, value)| match value {
                        Value::String(s) => (key, s),
                        other => (key, other.to_string()),
                    })
                    .collect()
            })
            .collect();
        Ok(Self(records))
    }

    /// Read and parse records from a file on disk.
    ///
    /// # Errors
    /// Returns [`SourceError`] when the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_str(&data)
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.0
    }
}
