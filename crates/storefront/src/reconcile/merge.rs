//! Merge-on-login.
//!
//! When a customer signs in, the anonymous cart they built must end up bound
//! to their account:
//!
//! - no cart, or an empty one: associate the token with it
//! - a cart with lines: create a fresh cart seeded with the same lines,
//!   discount codes and the customer's identity, then switch the session to
//!   it
//!
//! Recreating instead of mutating means a concurrent edit to the old cart
//! can never be half-applied to the new one.

use std::sync::Arc;
use std::time::Duration;

use larder_core::{
    BuyerIdentityInput, Cart, CartCreateInput, CustomerAccessToken, ErrorKind,
    ReconciliationResult,
};
use tracing::{debug, info, instrument, warn};

use super::associate::CustomerAssociator;
use super::context::CartContext;
use super::services::{CartService, IdentityService};
use super::snapshot::CartSnapshotReader;
use super::timeout::bounded;

/// Orchestrates merge-on-login.
///
/// Makes at most one merge attempt per call. Concurrent calls for the same
/// session are not deduplicated.
#[derive(Clone)]
pub struct CartMergeCoordinator {
    carts: Arc<dyn CartService>,
    identity: Arc<dyn IdentityService>,
    reader: CartSnapshotReader,
    associator: CustomerAssociator,
    timeout: Duration,
}

impl CartMergeCoordinator {
    #[must_use]
    pub fn new(
        carts: Arc<dyn CartService>,
        identity: Arc<dyn IdentityService>,
        timeout: Duration,
    ) -> Self {
        Self {
            reader: CartSnapshotReader::new(carts.clone(), timeout),
            associator: CustomerAssociator::new(carts.clone(), timeout),
            carts,
            identity,
            timeout,
        }
    }

    /// Reconcile the session's cart with the signed-in customer.
    ///
    /// On success the context points at the reconciled cart. On failure it
    /// is left as it was and the result carries the last known good cart.
    #[instrument(skip_all, fields(cart_id = ctx.cart_id().map_or("-", |id| id.as_str())))]
    pub async fn merge_on_login(&self, ctx: &mut CartContext) -> ReconciliationResult {
        if !self.identity.is_logged_in().await {
            debug!("Merge skipped, customer not logged in");
            return ReconciliationResult::failure(ErrorKind::NotAuthenticated, None);
        }

        let token = match bounded(
            self.timeout,
            "identity.access_token",
            self.identity.access_token(),
        )
        .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not obtain customer access token");
                return ReconciliationResult::failure(e.kind(), None);
            }
        };

        let current = match self.reader.read(ctx).await {
            Ok(cart) => cart,
            Err(kind) => return ReconciliationResult::failure(kind, None),
        };

        let result = match current {
            None => {
                debug!("No cart to merge, creating customer cart");
                self.associator.associate_new(&token).await
            }
            Some(cart) if cart.is_empty() => {
                debug!("Cart has no lines, associating in place");
                self.associator.associate(&cart, &token).await
            }
            Some(cart) => self.recreate(cart, token).await,
        };

        // Provider rejections surface as a merge failure whichever path ran.
        let result = match result {
            ReconciliationResult::Failure {
                reason: ErrorKind::AssociationFailed,
                cart,
            } => ReconciliationResult::failure(ErrorKind::MergeFailed, cart),
            other => other,
        };

        if let ReconciliationResult::Success { cart } = &result {
            ctx.replace(cart.id.clone());
        }
        result
    }

    /// Create a customer cart carrying every line of `cart`.
    async fn recreate(&self, cart: Cart, token: CustomerAccessToken) -> ReconciliationResult {
        let lines = match cart.line_inputs() {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "Cart line cannot be copied");
                return ReconciliationResult::failure(ErrorKind::InvalidCartState, Some(cart));
            }
        };

        let input = CartCreateInput {
            lines,
            discount_codes: cart.discount_code_strings(),
            buyer_identity: Some(BuyerIdentityInput::for_customer(token)),
        };

        let payload = match bounded(self.timeout, "cart.create", self.carts.create(input)).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Merge cart creation did not complete");
                return ReconciliationResult::failure(e.kind(), Some(cart));
            }
        };

        if payload.has_errors() {
            warn!(errors = %payload.error_summary(), "Provider rejected merged cart");
            return ReconciliationResult::failure(ErrorKind::MergeFailed, Some(cart));
        }

        let Some(merged) = payload.cart else {
            warn!("Merge cart creation returned no cart");
            return ReconciliationResult::failure(ErrorKind::MergeFailed, Some(cart));
        };

        if !merged.is_associated() {
            warn!(new_cart_id = %merged.id, "Merged cart has no customer");
            return ReconciliationResult::failure(ErrorKind::MergeFailed, Some(cart));
        }

        if merged.total_quantity < cart.total_quantity {
            warn!(
                new_cart_id = %merged.id,
                before = cart.total_quantity,
                after = merged.total_quantity,
                "Merged cart lost items, keeping original"
            );
            return ReconciliationResult::failure(ErrorKind::MergeFailed, Some(cart));
        }

        info!(
            old_cart_id = %cart.id,
            new_cart_id = %merged.id,
            lines = merged.lines.len(),
            "Cart merged into customer cart"
        );
        ReconciliationResult::success(merged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use larder_core::{CartId, DiscountCode, MerchandiseId};

    use super::*;
    use crate::reconcile::context::CartChange;
    use crate::reconcile::services::{IdentityError, ProviderError};
    use crate::reconcile::testing::{
        CartCall, InMemoryCartService, StaticIdentity, anonymous_cart,
    };

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn token() -> CustomerAccessToken {
        CustomerAccessToken::new("shcat_customer_token_1234").unwrap()
    }

    fn coordinator(
        carts: &Arc<InMemoryCartService>,
        identity: StaticIdentity,
    ) -> CartMergeCoordinator {
        CartMergeCoordinator::new(carts.clone(), Arc::new(identity), TIMEOUT)
    }

    fn multiset(cart: &Cart) -> HashMap<MerchandiseId, i64> {
        let mut counts = HashMap::new();
        for line in &cart.lines {
            *counts.entry(line.merchandise_id.clone()).or_insert(0) += line.quantity;
        }
        counts
    }

    #[tokio::test]
    async fn test_not_logged_in_makes_no_cart_calls() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[("A", 2)])).await;
        let identity = Arc::new(StaticIdentity::anonymous());
        let coordinator = CartMergeCoordinator::new(carts.clone(), identity.clone(), TIMEOUT);
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let result = coordinator.merge_on_login(&mut ctx).await;

        assert_eq!(
            result,
            ReconciliationResult::failure(ErrorKind::NotAuthenticated, None)
        );
        assert_eq!(carts.call_count().await, 0);
        assert_eq!(identity.token_calls(), 0);
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_empty_cart_takes_associate_path() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[])).await;
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert!(result.is_success());
        assert!(carts.create_calls().await.is_empty());
        assert!(
            carts
                .calls()
                .await
                .iter()
                .any(|c| matches!(c, CartCall::UpdateBuyerIdentity { .. }))
        );
        assert_eq!(ctx.cart_id(), Some(&CartId::new("c1")));
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_associate_path_rejection_is_merge_failed() {
        let carts = Arc::new(InMemoryCartService::new());
        let cart = anonymous_cart("c1", &[]);
        carts.insert(cart.clone()).await;
        carts
            .fail_next_identity_update(vec![ProviderError::message("invalid token")])
            .await;
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert_eq!(
            result,
            ReconciliationResult::failure(ErrorKind::MergeFailed, Some(cart))
        );
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_new_cart_rejection_is_merge_failed() {
        let carts = Arc::new(InMemoryCartService::new());
        carts
            .fail_next_create(vec![ProviderError::message("Throttled")])
            .await;
        let mut ctx = CartContext::new(None);

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert_eq!(
            result,
            ReconciliationResult::failure(ErrorKind::MergeFailed, None)
        );
        assert!(ctx.cart_id().is_none());
    }

    #[tokio::test]
    async fn test_missing_cart_creates_customer_cart() {
        let carts = Arc::new(InMemoryCartService::new());
        let mut ctx = CartContext::default();

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert!(result.is_success());
        let created = result.cart().unwrap();
        assert!(created.is_associated());
        assert!(created.is_empty());
        assert_eq!(
            ctx.pending_change(),
            Some(&CartChange::Replaced(created.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_cart_with_lines_is_recreated_with_token() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[("A", 2)])).await;
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        let creates = carts.create_calls().await;
        assert_eq!(creates.len(), 1);
        let input = creates.first().unwrap();
        assert_eq!(input.lines.len(), 1);
        assert_eq!(input.lines.first().unwrap().merchandise_id.as_str(), "A");
        assert_eq!(input.lines.first().unwrap().quantity, 2);
        assert_eq!(
            input
                .buyer_identity
                .as_ref()
                .and_then(|b| b.customer_access_token.clone()),
            Some(token())
        );

        assert!(result.is_success());
        let merged = result.cart().unwrap();
        assert_ne!(merged.id, CartId::new("c1"));
        assert_eq!(ctx.cart_id(), Some(&merged.id));
    }

    #[tokio::test]
    async fn test_recreate_copies_lines_as_multiset() {
        let carts = Arc::new(InMemoryCartService::new());
        let mut original = anonymous_cart("c1", &[("A", 2), ("B", 1), ("A", 3)]);
        original.discount_codes = vec![DiscountCode {
            code: "WELCOME".to_string(),
            applicable: true,
        }];
        original
            .lines
            .get_mut(1)
            .unwrap()
            .attributes
            .insert("_bundle_id".to_string(), "hamper".to_string());
        carts.insert(original.clone()).await;
        let mut ctx = CartContext::new(Some(original.id.clone()));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        let merged = result.cart().unwrap();
        assert_eq!(multiset(merged), multiset(&original));
        assert_eq!(merged.discount_code_strings(), vec!["WELCOME"]);
        assert_eq!(
            merged
                .lines
                .get(1)
                .unwrap()
                .attributes
                .get("_bundle_id")
                .map(String::as_str),
            Some("hamper")
        );
    }

    #[tokio::test]
    async fn test_create_errors_keep_pre_merge_cart() {
        let carts = Arc::new(InMemoryCartService::new());
        let original = anonymous_cart("c1", &[("A", 2)]);
        carts.insert(original.clone()).await;
        carts
            .fail_next_create(vec![ProviderError::message("Merchandise is sold out")])
            .await;
        let mut ctx = CartContext::new(Some(original.id.clone()));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert_eq!(
            result,
            ReconciliationResult::failure(ErrorKind::MergeFailed, Some(original))
        );
        assert!(ctx.pending_change().is_none());
        assert_eq!(carts.create_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unassociated_merged_cart_is_failure() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[("A", 1)])).await;
        carts.set_ignore_buyer_identity(true).await;
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert_eq!(result.reason(), Some(ErrorKind::MergeFailed));
        assert_eq!(result.cart().map(|c| c.id.as_str()), Some("c1"));
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_invalid_line_is_reported() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[("A", 1), ("", 1)])).await;
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert_eq!(result.reason(), Some(ErrorKind::InvalidCartState));
        assert_eq!(result.cart().map(|c| c.lines.len()), Some(2));
        assert!(carts.create_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_outage_is_transient() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.set_unavailable(true).await;
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let result = coordinator(&carts, StaticIdentity::logged_in(token()))
            .merge_on_login(&mut ctx)
            .await;

        assert_eq!(result.reason(), Some(ErrorKind::TransientFetch));
        assert_eq!(carts.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_token_errors() {
        let carts = Arc::new(InMemoryCartService::new());
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let expired = coordinator(
            &carts,
            StaticIdentity::failing(IdentityError::Expired("refresh rejected".to_string())),
        )
        .merge_on_login(&mut ctx)
        .await;
        assert_eq!(expired.reason(), Some(ErrorKind::NotAuthenticated));

        let outage = coordinator(
            &carts,
            StaticIdentity::failing(IdentityError::Transport("503".to_string())),
        )
        .merge_on_login(&mut ctx)
        .await;
        assert_eq!(outage.reason(), Some(ErrorKind::TransientFetch));

        assert_eq!(carts.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_slow_create_times_out_as_transient() {
        let carts = Arc::new(InMemoryCartService::new());
        let original = anonymous_cart("c1", &[("A", 1)]);
        carts.insert(original.clone()).await;
        let coordinator = CartMergeCoordinator::new(
            carts.clone(),
            Arc::new(StaticIdentity::logged_in(token())),
            Duration::from_millis(50),
        );
        let mut ctx = CartContext::new(Some(original.id.clone()));

        carts.set_latency(Some(Duration::from_millis(500))).await;
        let result = coordinator.merge_on_login(&mut ctx).await;

        assert_eq!(result.reason(), Some(ErrorKind::TransientFetch));
        assert!(ctx.pending_change().is_none());
    }
}
