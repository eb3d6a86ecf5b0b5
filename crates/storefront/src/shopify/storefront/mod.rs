//! Shopify Storefront API client implementation.
//!
//! Uses `graphql_client` envelopes with `reqwest` 0.13 for HTTP.
//! Cart reads for display are cached for a few seconds using `moka`.

mod cache;
mod conversions;

pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use graphql_client::{GraphQLQuery, Response};
use larder_core::{BuyerIdentityInput, Cart, CartCreateInput, CartId, CartLineId, CartLineInput};
use secrecy::ExposeSecret;
use tracing::{debug, instrument};

use crate::config::ShopifyStorefrontConfig;
use crate::shopify::types::{CartLineUpdate, CartPayloadFields, CartUserError};
use crate::shopify::{GraphQLError, GraphQLErrorLocation, ShopifyError};

use cache::CartCache;
use conversions::{
    convert_buyer_identity_input, convert_cart, convert_cart_create_input, convert_line_input,
    convert_line_update,
};
use queries::{
    AddToCart, CreateCart, GetCart, RemoveFromCart, UpdateBuyerIdentity, UpdateCartLines,
    add_to_cart, create_cart, get_cart, remove_from_cart, update_buyer_identity,
    update_cart_lines,
};

/// How long a cart snapshot may be served from cache to display routes.
const CART_CACHE_TTL: Duration = Duration::from_secs(10);

/// Whether a cart read may be served from the short-lived cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Serve from cache when a fresh entry exists.
    CacheFirst,
    /// Always ask Shopify, then refresh the cache entry.
    BypassCache,
}

/// Result of a cart mutation.
///
/// User errors are data, not `Err`: an HTTP 200 with a populated
/// `userErrors` list is still a failed mutation and callers must inspect it.
#[derive(Debug, Clone)]
pub struct CartMutation {
    /// Cart returned by the mutation.
    pub cart: Option<Cart>,
    /// Errors reported by Shopify.
    pub user_errors: Vec<CartUserError>,
}

impl CartMutation {
    fn from_payload(payload: Option<CartPayloadFields>) -> Self {
        payload.map_or_else(
            || Self {
                cart: None,
                user_errors: vec![],
            },
            |p| Self {
                cart: p.cart.map(convert_cart),
                user_errors: p.user_errors,
            },
        )
    }

    /// Collapse into a cart, treating user errors as failure.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::UserError` if Shopify reported user errors, or
    /// `ShopifyError::GraphQL` if no cart came back.
    pub fn into_cart(self, action: &str) -> Result<Cart, ShopifyError> {
        if !self.user_errors.is_empty() {
            return Err(ShopifyError::UserError(
                self.user_errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; "),
            ));
        }

        self.cart.ok_or_else(|| {
            ShopifyError::GraphQL(vec![GraphQLError::message(format!("Failed to {action}"))])
        })
    }
}

// =============================================================================
// StorefrontClient
// =============================================================================

/// Client for the Shopify Storefront API cart operations.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    cache: CartCache,
}

impl StorefrontClient {
    /// Create a new Storefront API client.
    ///
    /// `request_timeout` bounds every HTTP request made by the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: &ShopifyStorefrontConfig,
        request_timeout: Duration,
    ) -> Result<Self, ShopifyError> {
        let endpoint = format!(
            "https://{}/api/{}/graphql.json",
            config.store, config.api_version
        );

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(StorefrontClientInner {
                client,
                endpoint,
                access_token: config.storefront_private_token.expose_secret().to_string(),
                cache: CartCache::new(CART_CACHE_TTL),
            }),
        })
    }

    /// Execute a GraphQL operation.
    async fn execute<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, ShopifyError>
    where
        Q::Variables: serde::Serialize,
    {
        let request_body = Q::build_query(variables);

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            // Private access tokens use a different header than public tokens
            .header(
                "Shopify-Storefront-Private-Token",
                &self.inner.access_token,
            )
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if status.is_server_error() {
            tracing::warn!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Shopify API unavailable"
            );
            return Err(ShopifyError::Unavailable(status.as_u16()));
        }

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Shopify API returned non-success status"
            );
            return Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
                "HTTP {status}: {}",
                response_text.chars().take(200).collect::<String>()
            ))]));
        }

        let response: Response<Q::ResponseData> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse Shopify GraphQL response"
                );
                return Err(ShopifyError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            tracing::debug!(errors = ?errors, "GraphQL errors in response");

            return Err(ShopifyError::GraphQL(
                errors
                    .into_iter()
                    .map(|e| GraphQLError {
                        message: e.message,
                        locations: e.locations.map_or_else(Vec::new, |locs| {
                            locs.into_iter()
                                .map(|l| GraphQLErrorLocation {
                                    line: i64::from(l.line),
                                    column: i64::from(l.column),
                                })
                                .collect()
                        }),
                        path: e.path.map_or_else(Vec::new, |p| {
                            p.into_iter()
                                .map(|fragment| match fragment {
                                    graphql_client::PathFragment::Key(s) => {
                                        serde_json::Value::String(s)
                                    }
                                    graphql_client::PathFragment::Index(i) => {
                                        serde_json::Value::Number(i.into())
                                    }
                                })
                                .collect()
                        }),
                    })
                    .collect(),
            ));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                body = %response_text.chars().take(500).collect::<String>(),
                "Shopify GraphQL response has no data and no errors"
            );
            ShopifyError::GraphQL(vec![GraphQLError::message("No data in response")])
        })
    }

    // =========================================================================
    // Cart Reads
    // =========================================================================

    /// Get an existing cart.
    ///
    /// Returns `Ok(None)` when Shopify no longer knows the cart (expired, or
    /// converted into an order at checkout).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn get_cart(
        &self,
        cart_id: &CartId,
        policy: FetchPolicy,
    ) -> Result<Option<Cart>, ShopifyError> {
        if policy == FetchPolicy::CacheFirst
            && let Some(cart) = self.inner.cache.get(cart_id).await
        {
            debug!("Cache hit for cart");
            return Ok(Some(cart));
        }

        let variables = get_cart::Variables {
            cart_id: cart_id.to_string(),
        };

        let data = self.execute::<GetCart>(variables).await?;

        match data.cart.map(convert_cart) {
            Some(cart) => {
                self.inner.cache.insert(&cart).await;
                Ok(Some(cart))
            }
            None => {
                self.inner.cache.invalidate(cart_id).await;
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Cart Mutations (never cached, invalidate on success)
    // =========================================================================

    /// Create a new cart, optionally seeded with lines, codes and buyer identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails. User errors are returned
    /// in the `CartMutation`.
    #[instrument(skip(self, input), fields(lines = input.lines.len()))]
    pub async fn create_cart(&self, input: CartCreateInput) -> Result<CartMutation, ShopifyError> {
        let variables = create_cart::Variables {
            input: convert_cart_create_input(input),
        };

        let data = self.execute::<CreateCart>(variables).await?;
        let mutation = CartMutation::from_payload(data.cart_create);
        self.refresh_cache(&mutation).await;
        Ok(mutation)
    }

    /// Add lines to a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    pub async fn add_to_cart(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineInput>,
    ) -> Result<CartMutation, ShopifyError> {
        let variables = add_to_cart::Variables {
            cart_id: cart_id.to_string(),
            lines: lines.into_iter().map(convert_line_input).collect(),
        };

        self.inner.cache.invalidate(cart_id).await;
        let data = self.execute::<AddToCart>(variables).await?;
        let mutation = CartMutation::from_payload(data.cart_lines_add);
        self.refresh_cache(&mutation).await;
        Ok(mutation)
    }

    /// Update cart line quantities.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    pub async fn update_cart_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineUpdate>,
    ) -> Result<CartMutation, ShopifyError> {
        let variables = update_cart_lines::Variables {
            cart_id: cart_id.to_string(),
            lines: lines.into_iter().map(convert_line_update).collect(),
        };

        self.inner.cache.invalidate(cart_id).await;
        let data = self.execute::<UpdateCartLines>(variables).await?;
        let mutation = CartMutation::from_payload(data.cart_lines_update);
        self.refresh_cache(&mutation).await;
        Ok(mutation)
    }

    /// Remove lines from a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, line_ids), fields(cart_id = %cart_id))]
    pub async fn remove_from_cart(
        &self,
        cart_id: &CartId,
        line_ids: Vec<CartLineId>,
    ) -> Result<CartMutation, ShopifyError> {
        let variables = remove_from_cart::Variables {
            cart_id: cart_id.to_string(),
            line_ids: line_ids.into_iter().map(String::from).collect(),
        };

        self.inner.cache.invalidate(cart_id).await;
        let data = self.execute::<RemoveFromCart>(variables).await?;
        let mutation = CartMutation::from_payload(data.cart_lines_remove);
        self.refresh_cache(&mutation).await;
        Ok(mutation)
    }

    /// Update the buyer identity of a cart.
    ///
    /// Idempotent on Shopify's side: repeating the call with the same token
    /// leaves the cart in the same associated state.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, identity), fields(cart_id = %cart_id))]
    pub async fn update_buyer_identity(
        &self,
        cart_id: &CartId,
        identity: &BuyerIdentityInput,
    ) -> Result<CartMutation, ShopifyError> {
        let variables = update_buyer_identity::Variables {
            cart_id: cart_id.to_string(),
            buyer_identity: convert_buyer_identity_input(identity),
        };

        self.inner.cache.invalidate(cart_id).await;
        let data = self.execute::<UpdateBuyerIdentity>(variables).await?;
        let mutation = CartMutation::from_payload(data.cart_buyer_identity_update);
        self.refresh_cache(&mutation).await;
        Ok(mutation)
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    async fn refresh_cache(&self, mutation: &CartMutation) {
        if mutation.user_errors.is_empty()
            && let Some(cart) = &mutation.cart
        {
            self.inner.cache.insert(cart).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_with_user_errors_is_failure() {
        let mutation = CartMutation {
            cart: None,
            user_errors: vec![
                CartUserError {
                    code: Some("INVALID".to_string()),
                    field: None,
                    message: "invalid token".to_string(),
                },
                CartUserError {
                    code: None,
                    field: None,
                    message: "try again".to_string(),
                },
            ],
        };

        let err = mutation.into_cart("add to cart").unwrap_err();
        assert_eq!(err.to_string(), "User error: invalid token; try again");
    }

    #[test]
    fn test_mutation_without_cart_is_failure() {
        let mutation = CartMutation::from_payload(None);
        let err = mutation.into_cart("create cart").unwrap_err();
        assert_eq!(err.to_string(), "GraphQL errors: Failed to create cart");
    }
}
