//! Types for Shopify Customer Account API OAuth.

use std::fmt;

use chrono::{DateTime, Utc};
use larder_core::{CustomerAccessToken, TokenError};
use serde::{Deserialize, Serialize};

/// Seconds before the real expiry at which a token is treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// OAuth Types
// ─────────────────────────────────────────────────────────────────────────────

/// Customer tokens obtained via OAuth, stored in the session.
#[derive(Clone, Serialize, Deserialize)]
pub struct CustomerTokens {
    /// The access token for API requests.
    pub access_token: String,
    /// The ID token (`OpenID` Connect).
    pub id_token: Option<String>,
    /// The refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds.
    pub expires_in: Option<i64>,
    /// Unix timestamp when the token was obtained.
    pub obtained_at: i64,
}

impl CustomerTokens {
    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against an explicit clock.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_in.is_some_and(|expires_in| {
            let expires_at = self.obtained_at + expires_in;
            now.timestamp() >= (expires_at - EXPIRY_BUFFER_SECS)
        })
    }

    /// The access token in the form cart operations accept.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Empty` if the stored token is blank.
    pub fn access_token(&self) -> Result<CustomerAccessToken, TokenError> {
        CustomerAccessToken::new(self.access_token.clone())
    }
}

impl fmt::Debug for CustomerTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerTokens")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Raw token response from Shopify OAuth endpoint.
#[derive(Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub(super) fn into_tokens(self, obtained_at: DateTime<Utc>) -> CustomerTokens {
        CustomerTokens {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
            obtained_at: obtained_at.timestamp(),
        }
    }
}
