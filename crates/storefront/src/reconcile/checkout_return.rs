//! Detecting a return from hosted checkout and refreshing the cart.
//!
//! Shopify converts a cart into an order at checkout and never tells the
//! storefront. Two signals reveal a return: the `Referer` header pointing at
//! a checkout domain, and a checkout-started marker the storefront wrote
//! when it redirected the customer out. Either one forces a cache-bypassing
//! resync of the cart.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use larder_core::{
    BuyerIdentityInput, Cart, CartCreateInput, CustomerAccessToken, ErrorKind,
    ReconciliationResult,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::associate::CustomerAssociator;
use super::context::CartContext;
use super::services::{CartService, IdentityService};
use super::snapshot::CartSnapshotReader;
use super::timeout::bounded;

// =============================================================================
// Detection
// =============================================================================

/// The parts of an incoming request detection looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Raw `Referer` header.
    pub referer: Option<String>,
}

/// Decides whether a request followed a checkout completion.
pub trait ReturnDetector: Send + Sync {
    fn is_returning_from_checkout(&self, request: &RequestMetadata) -> bool;
}

/// Matches the referrer's host and path against known checkout substrings.
///
/// The query string and fragment are ignored, so a search for "shop.app" on
/// the storefront itself does not count as a checkout return.
#[derive(Debug, Clone)]
pub struct RefererDetector {
    patterns: Vec<String>,
}

impl RefererDetector {
    #[must_use]
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl ReturnDetector for RefererDetector {
    fn is_returning_from_checkout(&self, request: &RequestMetadata) -> bool {
        let Some(referer) = request.referer.as_deref() else {
            return false;
        };

        let haystack = Url::parse(referer.trim()).map_or_else(
            |_| referer.to_lowercase(),
            |url| {
                format!(
                    "{}{}",
                    url.host_str().unwrap_or_default().to_lowercase(),
                    url.path().to_lowercase()
                )
            },
        );

        self.patterns.iter().any(|p| haystack.contains(p.as_str()))
    }
}

/// Whether a checkout-started marker calls for a forced refresh.
///
/// True only if a marker exists and is younger than `max_age`. The caller
/// must have already removed the marker from storage, so each marker is
/// evaluated at most once.
#[must_use]
pub fn should_force_refresh(
    stored: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> bool {
    let Some(started_at) = stored else {
        return false;
    };
    let Ok(age) = (now - started_at).to_std() else {
        // Marker from the future: clock skew between instances.
        return false;
    };
    age < max_age
}

/// A checkout-started marker that is consumed when checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutMarker {
    started_at: Option<DateTime<Utc>>,
}

impl CheckoutMarker {
    /// A marker written at `started_at`.
    #[must_use]
    pub const fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(started_at),
        }
    }

    /// A marker loaded from storage.
    #[must_use]
    pub const fn from_stored(started_at: Option<DateTime<Utc>>) -> Self {
        Self { started_at }
    }

    /// Check and consume the marker.
    pub fn should_force_refresh(&mut self, now: DateTime<Utc>, max_age: Duration) -> bool {
        should_force_refresh(self.started_at.take(), now, max_age)
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.started_at.is_some()
    }
}

// =============================================================================
// Refresh
// =============================================================================

/// What a detect-and-refresh check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Not a checkout return, or no cart to refresh.
    Skipped,
    /// The cart was resynchronized.
    Reconciled(ReconciliationResult),
    /// The cart no longer exists (the checkout completed). The context has
    /// been cleared.
    CartGone,
}

impl RefreshOutcome {
    /// Whether a forced resync ran, so the response must not be cached.
    #[must_use]
    pub const fn was_forced(&self) -> bool {
        !matches!(self, Self::Skipped)
    }

    /// What a display route should render after this check.
    ///
    /// A refresh that failed without a snapshot defers to the cached read,
    /// so an outage on return never blanks the cart.
    #[must_use]
    pub fn displayed_cart(&self) -> DisplayedCart {
        match self {
            Self::Skipped => DisplayedCart::Cached,
            Self::CartGone => DisplayedCart::Gone,
            Self::Reconciled(result) => result
                .cart()
                .cloned()
                .map_or(DisplayedCart::Cached, DisplayedCart::Fresh),
        }
    }
}

/// The cart a display route shows once a refresh check has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayedCart {
    /// Show this snapshot.
    Fresh(Cart),
    /// Nothing fresher is known; use the regular cached read.
    Cached,
    /// The cart was converted into an order.
    Gone,
}

/// Detects checkout returns and rebuilds the cart afterwards.
#[derive(Clone)]
pub struct CheckoutReturnDetector {
    detector: Arc<dyn ReturnDetector>,
    carts: Arc<dyn CartService>,
    identity: Arc<dyn IdentityService>,
    reader: CartSnapshotReader,
    associator: CustomerAssociator,
    timeout: Duration,
    marker_max_age: Duration,
}

impl CheckoutReturnDetector {
    #[must_use]
    pub fn new(
        detector: Arc<dyn ReturnDetector>,
        carts: Arc<dyn CartService>,
        identity: Arc<dyn IdentityService>,
        timeout: Duration,
        marker_max_age: Duration,
    ) -> Self {
        Self {
            detector,
            reader: CartSnapshotReader::new(carts.clone(), timeout),
            associator: CustomerAssociator::new(carts.clone(), timeout),
            carts,
            identity,
            timeout,
            marker_max_age,
        }
    }

    /// Whether this navigation follows a checkout. Consumes `marker`.
    pub fn is_returning(
        &self,
        request: &RequestMetadata,
        marker: &mut CheckoutMarker,
        now: DateTime<Utc>,
    ) -> bool {
        // Evaluate the marker unconditionally so it is always consumed.
        let marker_fresh = marker.should_force_refresh(now, self.marker_max_age);
        self.detector.is_returning_from_checkout(request) || marker_fresh
    }

    /// The passive check run on page load.
    #[instrument(skip_all)]
    pub async fn detect_and_refresh(
        &self,
        ctx: &mut CartContext,
        request: &RequestMetadata,
        marker: &mut CheckoutMarker,
        now: DateTime<Utc>,
    ) -> RefreshOutcome {
        if !self.is_returning(request, marker, now) {
            return RefreshOutcome::Skipped;
        }
        info!("Checkout return detected, refreshing cart");
        self.refresh(ctx).await
    }

    /// Rebuild the cart from its current lines.
    ///
    /// If the new cart cannot be created, falls back to a forced re-read of
    /// the existing cart rather than failing the navigation.
    #[instrument(skip_all, fields(cart_id = ctx.cart_id().map_or("-", |id| id.as_str())))]
    pub async fn refresh(&self, ctx: &mut CartContext) -> RefreshOutcome {
        if ctx.cart_id().is_none() {
            debug!("No cart to refresh");
            return RefreshOutcome::Skipped;
        }

        let cart = match self.reader.read(ctx).await {
            Ok(Some(cart)) => cart,
            Ok(None) => {
                info!("Cart no longer exists after checkout, clearing reference");
                ctx.clear();
                return RefreshOutcome::CartGone;
            }
            Err(kind) => {
                return RefreshOutcome::Reconciled(ReconciliationResult::failure(kind, None));
            }
        };

        if cart.is_empty() {
            return RefreshOutcome::Reconciled(ReconciliationResult::success(cart));
        }

        let lines = match cart.line_inputs() {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "Cart line cannot be copied");
                return RefreshOutcome::Reconciled(ReconciliationResult::failure(
                    ErrorKind::InvalidCartState,
                    Some(cart),
                ));
            }
        };

        let token = match self.buyer_token().await {
            Ok(token) => token,
            Err(kind) => {
                warn!(reason = %kind, "Customer token unavailable, keeping existing cart");
                return RefreshOutcome::Reconciled(ReconciliationResult::failure(
                    kind,
                    Some(cart),
                ));
            }
        };
        if token.is_none() && cart.is_associated() {
            // Recreating without a token would strip the buyer identity.
            debug!("Associated cart with no signed-in customer, keeping existing cart");
            return RefreshOutcome::Reconciled(ReconciliationResult::success(cart));
        }

        let input = CartCreateInput {
            lines,
            discount_codes: cart.discount_code_strings(),
            buyer_identity: token.clone().map(BuyerIdentityInput::for_customer),
        };

        match bounded(self.timeout, "cart.create", self.carts.create(input)).await {
            Ok(payload) if !payload.has_errors() => match payload.cart {
                Some(fresh) if fresh.total_quantity < cart.total_quantity => {
                    warn!(
                        old_quantity = cart.total_quantity,
                        new_quantity = fresh.total_quantity,
                        "Recreated cart is missing items, falling back to re-read"
                    );
                }
                Some(fresh) if token.is_none() || fresh.is_associated() => {
                    info!(old_cart_id = %cart.id, new_cart_id = %fresh.id, "Cart recreated after checkout");
                    ctx.replace(fresh.id.clone());
                    return RefreshOutcome::Reconciled(ReconciliationResult::success(fresh));
                }
                _ => warn!("Recreated cart unusable, falling back to re-read"),
            },
            Ok(payload) => {
                warn!(errors = %payload.error_summary(), "Cart recreate rejected, falling back to re-read");
            }
            Err(e) => warn!(error = %e, "Cart recreate did not complete, falling back to re-read"),
        }

        self.fallback(ctx, cart, token).await
    }

    /// Force a re-read of the existing cart, re-associating it once if the
    /// customer is signed in and the cart lost its identity.
    async fn fallback(
        &self,
        ctx: &mut CartContext,
        previous: Cart,
        token: Option<CustomerAccessToken>,
    ) -> RefreshOutcome {
        let current = match self.reader.read(ctx).await {
            Ok(Some(cart)) => cart,
            Ok(None) => {
                ctx.clear();
                return RefreshOutcome::CartGone;
            }
            Err(kind) => {
                return RefreshOutcome::Reconciled(ReconciliationResult::failure(
                    kind,
                    Some(previous),
                ));
            }
        };

        let Some(token) = token.filter(|_| !current.is_associated()) else {
            return RefreshOutcome::Reconciled(ReconciliationResult::success(current));
        };

        debug!("Re-read cart is not associated, attempting one association");
        match self.associator.associate(&current, &token).await {
            ReconciliationResult::Success { cart } => {
                RefreshOutcome::Reconciled(ReconciliationResult::success(cart))
            }
            ReconciliationResult::Failure { .. } => RefreshOutcome::Reconciled(
                ReconciliationResult::failure(ErrorKind::MergeFailed, Some(current)),
            ),
        }
    }

    /// The customer's token, or `None` when nobody is signed in.
    ///
    /// A signed-in customer whose token cannot be obtained is an error: the
    /// cart must not be rebuilt without them.
    async fn buyer_token(&self) -> Result<Option<CustomerAccessToken>, ErrorKind> {
        if !self.identity.is_logged_in().await {
            return Ok(None);
        }
        bounded(
            self.timeout,
            "identity.access_token",
            self.identity.access_token(),
        )
        .await
        .map(Some)
        .map_err(|e| e.kind())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use larder_core::CartId;

    use super::*;
    use crate::reconcile::services::{IdentityError, ProviderError};
    use crate::reconcile::testing::{
        InMemoryCartService, StaticIdentity, anonymous_cart, associated_cart,
    };

    const HOUR: Duration = Duration::from_secs(3600);

    fn detector() -> RefererDetector {
        RefererDetector::new(["checkout.shopify.com", "shop.app", "/checkouts/"])
    }

    fn referer(value: &str) -> RequestMetadata {
        RequestMetadata {
            referer: Some(value.to_string()),
        }
    }

    fn token() -> CustomerAccessToken {
        CustomerAccessToken::new("shcat_customer_token_1234").unwrap()
    }

    fn return_detector(
        carts: &Arc<InMemoryCartService>,
        identity: StaticIdentity,
    ) -> CheckoutReturnDetector {
        CheckoutReturnDetector::new(
            Arc::new(detector()),
            carts.clone(),
            Arc::new(identity),
            Duration::from_secs(1),
            HOUR,
        )
    }

    #[test]
    fn test_referer_matching() {
        let d = detector();
        assert!(d.is_returning_from_checkout(&referer("https://checkout.shopify.com/c/123")));
        assert!(d.is_returning_from_checkout(&referer("https://SHOP.APP/pay")));
        assert!(d.is_returning_from_checkout(&referer(
            "https://larder.test/checkouts/cn/abc/thank-you"
        )));
        assert!(!d.is_returning_from_checkout(&referer("https://larder.test/products/jam")));
        assert!(!d.is_returning_from_checkout(&referer("https://larder.test/search?q=shop.app")));
        assert!(!d.is_returning_from_checkout(&RequestMetadata::default()));
    }

    #[test]
    fn test_unparseable_referer_matches_raw() {
        assert!(detector().is_returning_from_checkout(&referer("checkout.shopify.com/x")));
    }

    #[test]
    fn test_marker_fresh_then_consumed() {
        let t = Utc::now();
        let mut marker = CheckoutMarker::started(t);
        let later = t + TimeDelta::minutes(30);

        assert!(marker.should_force_refresh(later, HOUR));
        assert!(!marker.is_present());
        assert!(!marker.should_force_refresh(later, HOUR));
    }

    #[test]
    fn test_marker_older_than_max_age() {
        let t = Utc::now();
        assert!(!should_force_refresh(Some(t), t + TimeDelta::minutes(61), HOUR));
        assert!(!should_force_refresh(Some(t), t + TimeDelta::hours(1), HOUR));
        assert!(!should_force_refresh(None, t, HOUR));
    }

    #[test]
    fn test_future_marker_ignored() {
        let t = Utc::now();
        assert!(!should_force_refresh(Some(t + TimeDelta::minutes(5)), t, HOUR));
    }

    #[test]
    fn test_is_returning_consumes_marker_even_with_referer() {
        let carts = Arc::new(InMemoryCartService::new());
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let now = Utc::now();
        let mut marker = CheckoutMarker::started(now);

        assert!(d.is_returning(&referer("https://checkout.shopify.com/"), &mut marker, now));
        assert!(!marker.is_present());
    }

    #[tokio::test]
    async fn test_not_returning_skips() {
        let carts = Arc::new(InMemoryCartService::new());
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d
            .detect_and_refresh(
                &mut ctx,
                &RequestMetadata::default(),
                &mut CheckoutMarker::default(),
                Utc::now(),
            )
            .await;

        assert_eq!(outcome, RefreshOutcome::Skipped);
        assert_eq!(carts.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_completed_checkout_clears_cart() {
        let carts = Arc::new(InMemoryCartService::new());
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let mut ctx = CartContext::new(Some(CartId::new("ordered")));

        let outcome = d.refresh(&mut ctx).await;

        assert_eq!(outcome, RefreshOutcome::CartGone);
        assert!(ctx.cart_id().is_none());
    }

    #[tokio::test]
    async fn test_refresh_recreates_with_attributes_and_token() {
        let carts = Arc::new(InMemoryCartService::new());
        let mut cart = anonymous_cart("c1", &[("A", 2)]);
        cart.lines
            .first_mut()
            .unwrap()
            .attributes
            .insert("_bundle_id".to_string(), "xmas".to_string());
        carts.insert(cart).await;
        let d = return_detector(&carts, StaticIdentity::logged_in(token()));
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        let RefreshOutcome::Reconciled(result) = outcome else {
            panic!("expected reconciled outcome");
        };
        assert!(result.is_success());
        let fresh = result.cart().unwrap();
        assert_ne!(fresh.id, CartId::new("c1"));
        assert!(fresh.is_associated());
        assert_eq!(
            fresh.lines.first().unwrap().attributes.get("_bundle_id").map(String::as_str),
            Some("xmas")
        );
        assert_eq!(ctx.cart_id(), Some(&fresh.id));
    }

    #[tokio::test]
    async fn test_anonymous_refresh_has_no_buyer_identity() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[("A", 1)])).await;
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        assert!(matches!(outcome, RefreshOutcome::Reconciled(ref r) if r.is_success()));
        let creates = carts.create_calls().await;
        assert!(creates.first().unwrap().buyer_identity.is_none());
    }

    #[tokio::test]
    async fn test_create_failure_falls_back_to_reread() {
        let carts = Arc::new(InMemoryCartService::new());
        let cart = anonymous_cart("c1", &[("A", 1)]);
        carts.insert(cart.clone()).await;
        carts
            .fail_next_create(vec![ProviderError::message("Throttled")])
            .await;
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Reconciled(ReconciliationResult::success(cart))
        );
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_fallback_attempts_one_association() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[("A", 1)])).await;
        carts
            .fail_next_create(vec![ProviderError::message("Throttled")])
            .await;
        let d = return_detector(&carts, StaticIdentity::logged_in(token()));
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        let RefreshOutcome::Reconciled(result) = outcome else {
            panic!("expected reconciled outcome");
        };
        assert!(result.is_success());
        assert!(result.cart().unwrap().is_associated());
        assert_eq!(result.cart().unwrap().id, CartId::new("c1"));
    }

    #[tokio::test]
    async fn test_fallback_association_failure_is_merge_failed() {
        let carts = Arc::new(InMemoryCartService::new());
        let cart = anonymous_cart("c1", &[("A", 1)]);
        carts.insert(cart.clone()).await;
        carts
            .fail_next_create(vec![ProviderError::message("Throttled")])
            .await;
        carts
            .fail_next_identity_update(vec![ProviderError::message("invalid token")])
            .await;
        let d = return_detector(&carts, StaticIdentity::logged_in(token()));
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Reconciled(ReconciliationResult::failure(
                ErrorKind::MergeFailed,
                Some(cart)
            ))
        );
    }

    #[tokio::test]
    async fn test_token_outage_keeps_associated_cart() {
        let carts = Arc::new(InMemoryCartService::new());
        let cart = associated_cart("c1", &[("A", 2)]);
        carts.insert(cart.clone()).await;
        let d = return_detector(
            &carts,
            StaticIdentity::failing(IdentityError::Transport("503".to_string())),
        );
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Reconciled(ReconciliationResult::failure(
                ErrorKind::TransientFetch,
                Some(cart)
            ))
        );
        assert!(carts.create_calls().await.is_empty());
        assert_eq!(ctx.cart_id(), Some(&CartId::new("c1")));
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_associated_cart_not_stripped_when_signed_out() {
        let carts = Arc::new(InMemoryCartService::new());
        let cart = associated_cart("c1", &[("A", 1)]);
        carts.insert(cart.clone()).await;
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Reconciled(ReconciliationResult::success(cart))
        );
        assert!(carts.create_calls().await.is_empty());
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_recreate_missing_items_keeps_existing_cart() {
        let carts = Arc::new(InMemoryCartService::new());
        let cart = anonymous_cart("c1", &[("A", 1), ("B", 3)]);
        carts.insert(cart.clone()).await;
        carts.set_create_line_limit(Some(1)).await;
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Reconciled(ReconciliationResult::success(cart))
        );
        assert_eq!(carts.create_calls().await.len(), 1);
        assert_eq!(ctx.cart_id(), Some(&CartId::new("c1")));
        assert!(ctx.pending_change().is_none());
    }

    #[tokio::test]
    async fn test_read_outage_defers_to_cached_display() {
        let carts = Arc::new(InMemoryCartService::new());
        carts.insert(anonymous_cart("c1", &[("A", 1)])).await;
        carts.set_unavailable(true).await;
        let d = return_detector(&carts, StaticIdentity::anonymous());
        let mut ctx = CartContext::new(Some(CartId::new("c1")));

        let outcome = d.refresh(&mut ctx).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Reconciled(ReconciliationResult::failure(
                ErrorKind::TransientFetch,
                None
            ))
        );
        assert_eq!(outcome.displayed_cart(), DisplayedCart::Cached);
        assert_eq!(ctx.cart_id(), Some(&CartId::new("c1")));
    }

    #[test]
    fn test_displayed_cart_per_outcome() {
        let cart = anonymous_cart("c1", &[("A", 1)]);

        assert_eq!(RefreshOutcome::Skipped.displayed_cart(), DisplayedCart::Cached);
        assert_eq!(RefreshOutcome::CartGone.displayed_cart(), DisplayedCart::Gone);
        assert_eq!(
            RefreshOutcome::Reconciled(ReconciliationResult::success(cart.clone()))
                .displayed_cart(),
            DisplayedCart::Fresh(cart.clone())
        );
        assert_eq!(
            RefreshOutcome::Reconciled(ReconciliationResult::failure(
                ErrorKind::MergeFailed,
                Some(cart.clone())
            ))
            .displayed_cart(),
            DisplayedCart::Fresh(cart)
        );
    }
}
