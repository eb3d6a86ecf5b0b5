//! Shopify Customer Account API client.
//!
//! Only the OAuth 2.0 surface is used: customers sign in through Shopify's
//! hosted login and the resulting access token is attached to carts as the
//! buyer identity.
//!
//! # OAuth Flow
//!
//! 1. Generate authorization URL with `authorization_url()`
//! 2. Redirect customer to Shopify's login page
//! 3. Shopify redirects back with authorization code
//! 4. Exchange code for tokens with `exchange_code()`
//! 5. Refresh with `refresh_token()` when the access token expires
//!
//! # Example
//!
//! ```rust,ignore
//! use larder_storefront::shopify::CustomerClient;
//!
//! let client = CustomerClient::new(&config.shopify, Duration::from_secs(8))?;
//!
//! let auth_url = client.authorization_url("https://example.com/callback", &state, &nonce);
//!
//! // After OAuth callback, exchange code for tokens
//! let tokens = client.exchange_code(&code, "https://example.com/callback").await?;
//! ```

mod types;

pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::instrument;

use crate::config::ShopifyStorefrontConfig;
use crate::shopify::ShopifyError;

// ─────────────────────────────────────────────────────────────────────────────
// Customer Account Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the Shopify Customer Account API OAuth endpoints.
#[derive(Clone)]
pub struct CustomerClient {
    inner: Arc<CustomerClientInner>,
}

struct CustomerClientInner {
    client: reqwest::Client,
    store_id: String,
    client_id: String,
    client_secret: String,
}

impl CustomerClient {
    /// Create a new Customer Account API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: &ShopifyStorefrontConfig,
        request_timeout: Duration,
    ) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(CustomerClientInner {
                client,
                store_id: config.customer_shop_id.clone(),
                client_id: config.customer_client_id.clone(),
                client_secret: config.customer_client_secret.expose_secret().to_string(),
            }),
        })
    }

    /// Get the OAuth client ID (safe to expose in frontend).
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // OAuth Flow
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate the authorization URL for customer login.
    ///
    /// # Arguments
    ///
    /// * `redirect_uri` - The callback URL to redirect to after authentication
    /// * `state` - A random string stored in the session to prevent CSRF attacks
    /// * `nonce` - A random string for `OpenID` Connect replay protection
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &str, state: &str, nonce: &str) -> String {
        format!(
            "https://shopify.com/{}/auth/oauth/authorize?\
            client_id={}&\
            response_type=code&\
            redirect_uri={}&\
            scope=openid%20email%20customer-account-api:full&\
            state={}&\
            nonce={}",
            self.inner.store_id,
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(nonce)
        )
    }

    /// Generate the logout URL.
    ///
    /// # Arguments
    ///
    /// * `id_token` - The ID token from the current session
    /// * `post_logout_redirect_uri` - Where to redirect after logout
    #[must_use]
    pub fn logout_url(&self, id_token: &str, post_logout_redirect_uri: &str) -> String {
        format!(
            "https://shopify.com/{}/auth/oauth/logout?\
            id_token_hint={}&\
            post_logout_redirect_uri={}",
            self.inner.store_id,
            urlencoding::encode(id_token),
            urlencoding::encode(post_logout_redirect_uri)
        )
    }

    /// Exchange an authorization code for access tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<CustomerTokens, ShopifyError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        self.token_request(&params, "Token exchange").await
    }

    /// Refresh an access token using a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token refresh fails.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<CustomerTokens, ShopifyError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        self.token_request(&params, "Token refresh").await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        action: &str,
    ) -> Result<CustomerTokens, ShopifyError> {
        let url = format!(
            "https://shopify.com/{}/auth/oauth/token",
            self.inner.store_id
        );

        let response = self.inner.client.post(&url).form(params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "{action} rejected by Shopify");
            return Err(ShopifyError::OAuth(format!("{action} failed: {text}")));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(token_response.into_tokens(chrono::Utc::now()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config() -> ShopifyStorefrontConfig {
        ShopifyStorefrontConfig {
            store: "larder-test.myshopify.com".to_string(),
            api_version: "2026-01".to_string(),
            storefront_public_token: "public".to_string(),
            storefront_private_token: SecretString::from("private-token"),
            customer_client_id: "client id".to_string(),
            customer_client_secret: SecretString::from("client-secret"),
            customer_shop_id: "12345".to_string(),
        }
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let client = CustomerClient::new(&config(), Duration::from_secs(5)).unwrap();
        let url = client.authorization_url("https://larder.test/auth/shopify/callback", "st", "no");

        assert!(url.starts_with("https://shopify.com/12345/auth/oauth/authorize?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Flarder.test%2Fauth%2Fshopify%2Fcallback"));
        assert!(url.contains("state=st&nonce=no"));
    }

    #[test]
    fn test_logout_url() {
        let client = CustomerClient::new(&config(), Duration::from_secs(5)).unwrap();
        let url = client.logout_url("id.tok", "https://larder.test/");
        assert_eq!(
            url,
            "https://shopify.com/12345/auth/oauth/logout?id_token_hint=id.tok&post_logout_redirect_uri=https%3A%2F%2Flarder.test%2F"
        );
    }
}
