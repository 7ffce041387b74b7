//! Validated email addresses.
//!
//! A [`Address`] can only be constructed through [`Address::parse`], so any
//! value of the type is known to have a plausible `local@domain` shape. The
//! heavy lifting is delegated to `mailparse`; a few cheap structural checks
//! run first so that obviously broken input produces a clear error.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a raw string was rejected as an email address.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("malformed address: {0}")]
    Malformed(String),
}

/// A validated, trimmed email address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Trim and validate a raw address.
    ///
    /// # Errors
    /// Returns [`AddressError`] when the input is empty or does not parse as
    /// a single `local@domain` mailbox.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let malformed = || AddressError::Malformed(trimmed.to_string());

        if trimmed.chars().any(char::is_whitespace) {
            return Err(malformed());
        }
        let (local, domain) = trimmed.split_once('@').ok_or_else(malformed)?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(malformed());
        }

        match mailparse::addrparse(trimmed) {
            Ok(list) if list.len() == 1 => Ok(Self(trimmed.to_string())),
            Ok(_) => Err(malformed()),
            Err(e) => Err(AddressError::Malformed(format!("{trimmed}: {e}"))),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split_once('@').map_or("", |(local, _)| local)
    }

    /// The part after the `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_address() {
        let addr = Address::parse("jane.doe@example.com").unwrap();
        assert_eq!(addr.as_str(), "jane.doe@example.com");
        assert_eq!(addr.local_part(), "jane.doe");
        assert_eq!(addr.domain(), "example.com");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let addr = Address::parse("  user@example.org  ").unwrap();
        assert_eq!(addr.as_str(), "user@example.org");
    }

    #[test]
    fn test_parse_empty_is_rejected() {
        assert_eq!(Address::parse(""), Err(AddressError::Empty));
        assert_eq!(Address::parse("   "), Err(AddressError::Empty));
    }

    #[test]
    fn test_parse_malformed_is_rejected() {
        for raw in ["no-at-sign", "@example.com", "user@", "a b@example.com"] {
            assert!(
                matches!(Address::parse(raw), Err(AddressError::Malformed(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let addr = Address::parse("user@example.com").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"user@example.com\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        assert!(serde_json::from_str::<Address>("\"not-an-address\"").is_err());
    }
}
