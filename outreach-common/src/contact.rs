//! Contact records and first-name derivation.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Honorific prefixes stripped when deriving a first name. Matched
/// case-insensitively, with or without a trailing period.
const HONORIFICS: &[&str] = &["mr", "mrs", "ms", "dr", "prof", "rev", "sir", "madam"];

/// One email recipient with personalization fields.
///
/// Created once during loading and immutable thereafter; never persisted
/// beyond the campaign run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Validated recipient address.
    pub email: Address,
    /// Full display name as it appeared in the source, if any.
    pub display_name: Option<String>,
    /// First name derived from the display name, used for personalization.
    pub first_name: String,
    /// Remaining source fields, passed through as template context.
    #[serde(default)]
    pub fields: AHashMap<String, String>,
}

impl Contact {
    /// Build a contact, deriving `first_name` from the display name.
    #[must_use]
    pub fn new(
        email: Address,
        display_name: Option<String>,
        fallback_first_name: &str,
        fields: AHashMap<String, String>,
    ) -> Self {
        let first_name = derive_first_name(
            display_name.as_deref().unwrap_or_default(),
            fallback_first_name,
        );

        Self {
            email,
            display_name,
            first_name,
            fields,
        }
    }
}

/// Derive a first name from a free-form display name.
///
/// Takes the first whitespace-delimited token, skipping a leading honorific
/// ("Dr. Jane Smith" yields "Jane"). Falls back to `fallback` when nothing
/// usable remains.
#[must_use]
pub fn derive_first_name(display_name: &str, fallback: &str) -> String {
    let mut tokens = display_name.split_whitespace();
    let Some(first) = tokens.next() else {
        return fallback.to_string();
    };

    let bare = first.trim_end_matches('.').to_lowercase();
    if HONORIFICS.contains(&bare.as_str()) {
        tokens
            .next()
            .map_or_else(|| fallback.to_string(), ToString::to_string)
    } else {
        first.to_string()
    }
}
