//! Production implementations of the reconciliation service traits.

use async_trait::async_trait;
use larder_core::{BuyerIdentityInput, Cart, CartCreateInput, CartId, CustomerAccessToken};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use super::services::{
    CartPayload, CartService, IdentityError, IdentityService, ProviderError, ServiceError,
};
use crate::models::session_keys;
use crate::shopify::storefront::CartMutation;
use crate::shopify::{
    CartUserError, CustomerClient, CustomerTokens, FetchPolicy, ShopifyError, StorefrontClient,
};

// =============================================================================
// ShopifyCartService
// =============================================================================

/// [`CartService`] backed by the Storefront API.
///
/// Reads always bypass the display cache.
#[derive(Clone)]
pub struct ShopifyCartService {
    client: StorefrontClient,
}

impl ShopifyCartService {
    #[must_use]
    pub const fn new(client: StorefrontClient) -> Self {
        Self { client }
    }
}

impl From<CartUserError> for ProviderError {
    fn from(e: CartUserError) -> Self {
        Self {
            message: e.message,
            code: e.code,
            field: e.field,
        }
    }
}

fn service_error(e: ShopifyError) -> ServiceError {
    if e.is_transient() {
        return ServiceError::Transport(e.to_string());
    }
    ServiceError::Malformed(e.to_string())
}

/// Fold a mutation result into `{cart, errors[]}`.
///
/// Top-level GraphQL errors on a mutation are the provider rejecting the
/// request, so they become provider errors rather than `Err`.
fn into_payload(result: Result<CartMutation, ShopifyError>) -> Result<CartPayload, ServiceError> {
    match result {
        Ok(mutation) => Ok(CartPayload {
            cart: mutation.cart,
            errors: mutation
                .user_errors
                .into_iter()
                .map(ProviderError::from)
                .collect(),
        }),
        Err(ShopifyError::GraphQL(errors)) => Ok(CartPayload {
            cart: None,
            errors: errors
                .into_iter()
                .map(|e| ProviderError::message(e.message))
                .collect(),
        }),
        Err(e) => Err(service_error(e)),
    }
}

#[async_trait]
impl CartService for ShopifyCartService {
    async fn get(&self, cart_id: &CartId) -> Result<Option<Cart>, ServiceError> {
        self.client
            .get_cart(cart_id, FetchPolicy::BypassCache)
            .await
            .map_err(service_error)
    }

    async fn create(&self, input: CartCreateInput) -> Result<CartPayload, ServiceError> {
        into_payload(self.client.create_cart(input).await)
    }

    async fn update_buyer_identity(
        &self,
        cart_id: &CartId,
        identity: BuyerIdentityInput,
    ) -> Result<CartPayload, ServiceError> {
        into_payload(self.client.update_buyer_identity(cart_id, &identity).await)
    }
}

// =============================================================================
// SessionIdentity
// =============================================================================

/// [`IdentityService`] over the customer tokens stored in the session.
///
/// Expired access tokens are refreshed through the Customer Account API and
/// the refreshed tokens written back to the session. Callers running after
/// the response has been sent must `save()` the session themselves.
#[derive(Clone)]
pub struct SessionIdentity {
    session: Session,
    customer: CustomerClient,
}

impl SessionIdentity {
    #[must_use]
    pub const fn new(session: Session, customer: CustomerClient) -> Self {
        Self { session, customer }
    }

    async fn stored_tokens(&self) -> Result<Option<CustomerTokens>, IdentityError> {
        self.session
            .get::<CustomerTokens>(session_keys::SHOPIFY_CUSTOMER_TOKEN)
            .await
            .map_err(|e| IdentityError::Transport(format!("session store: {e}")))
    }

    #[instrument(skip_all)]
    async fn refresh(&self, stale: CustomerTokens) -> Result<CustomerTokens, IdentityError> {
        let Some(refresh_token) = stale.refresh_token.as_deref() else {
            return Err(IdentityError::Expired("no refresh token".to_string()));
        };

        let mut fresh = match self.customer.refresh_token(refresh_token).await {
            Ok(fresh) => fresh,
            Err(e) if e.is_transient() => return Err(IdentityError::Transport(e.to_string())),
            Err(e) => {
                warn!(error = %e, "Customer token refresh rejected");
                return Err(IdentityError::Expired(e.to_string()));
            }
        };

        // Shopify omits these on refresh; keep the originals for logout.
        if fresh.id_token.is_none() {
            fresh.id_token = stale.id_token;
        }
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = stale.refresh_token;
        }

        self.session
            .insert(session_keys::SHOPIFY_CUSTOMER_TOKEN, &fresh)
            .await
            .map_err(|e| IdentityError::Transport(format!("session store: {e}")))?;

        info!("Customer access token refreshed");
        Ok(fresh)
    }
}

#[async_trait]
impl IdentityService for SessionIdentity {
    async fn is_logged_in(&self) -> bool {
        match self.stored_tokens().await {
            Ok(tokens) => tokens.is_some(),
            Err(e) => {
                warn!(error = %e, "Could not read login state");
                false
            }
        }
    }

    async fn access_token(&self) -> Result<CustomerAccessToken, IdentityError> {
        let tokens = self.stored_tokens().await?.ok_or(IdentityError::NotLoggedIn)?;

        let tokens = if tokens.is_expired() {
            self.refresh(tokens).await?
        } else {
            tokens
        };

        tokens
            .access_token()
            .map_err(|e| IdentityError::Expired(e.to_string()))
    }
}
