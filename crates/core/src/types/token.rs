//! Customer access tokens.
//!
//! A customer access token is a capability: anyone holding it can act on
//! behalf of the customer until it expires. It is wrapped in a
//! [`SecretString`] so it never shows up in logs, and only a short
//! fingerprint is ever rendered.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Number of trailing characters shown in a token fingerprint.
const FINGERPRINT_CHARS: usize = 4;

/// Error constructing a [`CustomerAccessToken`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The identity provider handed back an empty token.
    #[error("customer access token is empty")]
    Empty,
}

/// Opaque, short-lived customer access token.
///
/// Non-empty by construction. `Debug` and `Display` only show a fingerprint.
#[derive(Clone)]
pub struct CustomerAccessToken(SecretString);

impl CustomerAccessToken {
    /// Wrap a raw token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Empty`] if the token is empty or whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self, TokenError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(Self(SecretString::from(raw)))
    }

    /// Expose the raw token for an outgoing API call.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Short, log-safe fingerprint (`…abcd`).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let raw = self.0.expose_secret();
        let tail: String = raw
            .chars()
            .rev()
            .take(FINGERPRINT_CHARS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("…{tail}")
    }
}

impl PartialEq for CustomerAccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.expose_secret() == other.0.expose_secret()
    }
}

impl Eq for CustomerAccessToken {}

impl fmt::Debug for CustomerAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomerAccessToken")
            .field(&self.fingerprint())
            .finish()
    }
}

impl fmt::Display for CustomerAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}
