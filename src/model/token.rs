use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalised one-time access code: uppercase, with spaces and hyphens
/// removed. This is the voter's only identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TokenCode(String);

impl TokenCode {
    /// Normalise raw user input, e.g. `"ab-12 34"` becomes `"AB1234"`.
    pub fn normalize(raw: &str) -> Self {
        let code = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_uppercase)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for TokenCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TokenCode {
    fn from(s: String) -> Self {
        Self::normalize(&s)
    }
}

impl From<&str> for TokenCode {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

impl From<TokenCode> for String {
    fn from(token: TokenCode) -> Self {
        token.0
    }
}

/// A token store record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: TokenCode,
    pub used: bool,
    /// Only set once `used` is true.
    pub used_at: Option<DateTime<Utc>>,
    /// Informational only, never consulted for authorization.
    pub email: Option<String>,
}

impl AccessToken {
    /// A fresh, unused token.
    pub fn new(token: TokenCode) -> Self {
        Self {
            token,
            used: false,
            used_at: None,
            email: None,
        }
    }

    /// Consume the token. Returns false, leaving the record untouched, if it
    /// was already used.
    pub fn consume(&mut self, at: DateTime<Utc>) -> bool {
        if self.used {
            return false;
        }
        self.used = true;
        self.used_at = Some(at);
        true
    }
}

/// Timestamps are stored as ISO-8601 with second precision and an explicit
/// UTC offset.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// Parse a stored timestamp, tolerating absent or legacy values.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
