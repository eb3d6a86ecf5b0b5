//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tower_sessions::Session;

use crate::config::StorefrontConfig;
use crate::reconcile::{
    CartMergeCoordinator, CartService, CheckoutReturnDetector, IdentityService, MergeSupervisor,
    RefererDetector, ReturnDetector, SessionIdentity, ShopifyCartService,
};
use crate::shopify::{CustomerClient, ShopifyError, StorefrontClient};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    storefront: StorefrontClient,
    customer: CustomerClient,
    carts: Arc<dyn CartService>,
    detector: Arc<dyn ReturnDetector>,
    supervisor: MergeSupervisor,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool (session store)
    /// * `supervisor` - Owner of background login merges
    ///
    /// # Errors
    ///
    /// Returns an error if either Shopify HTTP client cannot be built.
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        supervisor: MergeSupervisor,
    ) -> Result<Self, ShopifyError> {
        let timeout = config.reconcile.call_timeout;
        let storefront = StorefrontClient::new(&config.shopify, timeout)?;
        let customer = CustomerClient::new(&config.shopify, timeout)?;
        let carts: Arc<dyn CartService> = Arc::new(ShopifyCartService::new(storefront.clone()));
        let detector: Arc<dyn ReturnDetector> = Arc::new(RefererDetector::new(
            config.reconcile.checkout_referrers.iter().cloned(),
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                storefront,
                customer,
                carts,
                detector,
                supervisor,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the Shopify Storefront API client.
    #[must_use]
    pub fn storefront(&self) -> &StorefrontClient {
        &self.inner.storefront
    }

    /// Get a reference to the Shopify Customer Account API client.
    #[must_use]
    pub fn customer(&self) -> &CustomerClient {
        &self.inner.customer
    }

    /// Get a reference to the background merge supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &MergeSupervisor {
        &self.inner.supervisor
    }

    /// Identity service bound to this request's session.
    #[must_use]
    pub fn identity(&self, session: &Session) -> Arc<dyn IdentityService> {
        Arc::new(SessionIdentity::new(
            session.clone(),
            self.inner.customer.clone(),
        ))
    }

    /// Merge coordinator bound to this request's session.
    #[must_use]
    pub fn merge_coordinator(&self, session: &Session) -> CartMergeCoordinator {
        CartMergeCoordinator::new(
            self.inner.carts.clone(),
            self.identity(session),
            self.inner.config.reconcile.call_timeout,
        )
    }

    /// Checkout return detector bound to this request's session.
    #[must_use]
    pub fn checkout_return(&self, session: &Session) -> CheckoutReturnDetector {
        let reconcile = &self.inner.config.reconcile;
        CheckoutReturnDetector::new(
            self.inner.detector.clone(),
            self.inner.carts.clone(),
            self.identity(session),
            reconcile.call_timeout,
            reconcile.checkout_marker_max_age,
        )
    }
}
