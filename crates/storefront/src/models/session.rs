//! Session-stored state.
//!
//! Everything the storefront remembers about a visitor lives in the
//! `tower-sessions` session: the cart reference, the customer's OAuth tokens
//! and the checkout-started marker.

use chrono::{DateTime, Utc};
use larder_core::CartId;
use tower_sessions::Session;

use crate::reconcile::{CartChange, CartContext, CheckoutMarker};

/// Session keys.
pub mod keys {
    /// Key for storing the Shopify cart ID.
    pub const CART_ID: &str = "cart_id";

    /// Key for Shopify OAuth state (CSRF protection).
    pub const SHOPIFY_OAUTH_STATE: &str = "shopify_oauth_state";

    /// Key for Shopify OAuth nonce (`OpenID` Connect replay protection).
    pub const SHOPIFY_OAUTH_NONCE: &str = "shopify_oauth_nonce";

    /// Key for Shopify customer OAuth tokens.
    pub const SHOPIFY_CUSTOMER_TOKEN: &str = "shopify_customer_token";

    /// Key for the time the customer was last sent to checkout.
    pub const CHECKOUT_STARTED_AT: &str = "checkout_started_at";
}

/// Load the cart context for this request.
///
/// A session store failure is logged and treated as "no cart".
pub async fn load_cart_context(session: &Session) -> CartContext {
    match session.get::<CartId>(keys::CART_ID).await {
        Ok(cart_id) => CartContext::new(cart_id),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read cart ID from session");
            CartContext::default()
        }
    }
}

/// Persist the context's cart reference if it changed.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn commit_cart_context(
    session: &Session,
    ctx: &CartContext,
) -> Result<(), tower_sessions::session::Error> {
    match ctx.pending_change() {
        Some(CartChange::Replaced(cart_id)) => session.insert(keys::CART_ID, cart_id).await,
        Some(CartChange::Cleared) => {
            session.remove::<CartId>(keys::CART_ID).await?;
            Ok(())
        }
        None => Ok(()),
    }
}

/// Remove and return the checkout-started marker.
///
/// Removal happens on every call, so the marker is consumed by the first
/// check that sees it.
pub async fn take_checkout_marker(session: &Session) -> CheckoutMarker {
    match session
        .remove::<DateTime<Utc>>(keys::CHECKOUT_STARTED_AT)
        .await
    {
        Ok(started_at) => CheckoutMarker::from_stored(started_at),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read checkout marker from session");
            CheckoutMarker::default()
        }
    }
}

/// Record that the customer is being sent to checkout.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn mark_checkout_started(
    session: &Session,
    at: DateTime<Utc>,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::CHECKOUT_STARTED_AT, at).await
}
