//! Binding a signed-in customer to a cart.

use std::sync::Arc;
use std::time::Duration;

use larder_core::{
    BuyerIdentityInput, Cart, CartCreateInput, CustomerAccessToken, ErrorKind,
    ReconciliationResult,
};
use tracing::{info, instrument, warn};

use super::services::CartService;
use super::timeout::bounded;

/// Attaches a customer access token to a cart without touching its lines.
///
/// Makes exactly one provider call per invocation and never retries.
#[derive(Clone)]
pub struct CustomerAssociator {
    carts: Arc<dyn CartService>,
    timeout: Duration,
}

impl CustomerAssociator {
    #[must_use]
    pub fn new(carts: Arc<dyn CartService>, timeout: Duration) -> Self {
        Self { carts, timeout }
    }

    /// Bind `token` to an existing cart.
    ///
    /// Calling this twice with the same token leaves the cart in the same
    /// state. On any failure the original cart is returned unmodified.
    #[instrument(skip_all, fields(cart_id = %cart.id, token = %token.fingerprint()))]
    pub async fn associate(&self, cart: &Cart, token: &CustomerAccessToken) -> ReconciliationResult {
        let identity = BuyerIdentityInput::for_customer(token.clone());

        let payload = match bounded(
            self.timeout,
            "cart.update_buyer_identity",
            self.carts.update_buyer_identity(&cart.id, identity),
        )
        .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Buyer identity update did not complete");
                return ReconciliationResult::failure(e.kind(), Some(cart.clone()));
            }
        };

        if payload.has_errors() {
            warn!(errors = %payload.error_summary(), "Provider rejected buyer identity");
            return ReconciliationResult::failure(ErrorKind::AssociationFailed, Some(cart.clone()));
        }

        match payload.cart {
            Some(updated) if updated.is_associated() => {
                info!("Cart associated with customer");
                ReconciliationResult::success(updated)
            }
            Some(_) => {
                warn!("Provider accepted buyer identity but cart has no customer");
                ReconciliationResult::failure(ErrorKind::AssociationFailed, Some(cart.clone()))
            }
            None => {
                warn!("Buyer identity update returned no cart");
                ReconciliationResult::failure(ErrorKind::AssociationFailed, Some(cart.clone()))
            }
        }
    }

    /// Create an empty cart already bound to `token`.
    ///
    /// Used when a customer signs in without any cart, so later adds land in
    /// a customer cart from the start.
    #[instrument(skip_all, fields(token = %token.fingerprint()))]
    pub async fn associate_new(&self, token: &CustomerAccessToken) -> ReconciliationResult {
        let input = CartCreateInput {
            buyer_identity: Some(BuyerIdentityInput::for_customer(token.clone())),
            ..CartCreateInput::default()
        };

        let payload = match bounded(self.timeout, "cart.create", self.carts.create(input)).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Customer cart creation did not complete");
                return ReconciliationResult::failure(e.kind(), None);
            }
        };

        if payload.has_errors() {
            warn!(errors = %payload.error_summary(), "Provider rejected customer cart");
            return ReconciliationResult::failure(ErrorKind::AssociationFailed, None);
        }

        match payload.cart {
            Some(cart) if cart.is_associated() => {
                info!(cart_id = %cart.id, "Created customer cart");
                ReconciliationResult::success(cart)
            }
            _ => {
                warn!("Customer cart was not created with an associated customer");
                ReconciliationResult::failure(ErrorKind::AssociationFailed, None)
            }
        }
    }
}
