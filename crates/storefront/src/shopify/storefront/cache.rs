//! Short-lived cache for cart reads.
//!
//! Only display routes read through this cache. Reconciliation always
//! fetches with [`super::FetchPolicy::BypassCache`], which refreshes the
//! entry instead of reading it.

use std::time::Duration;

use larder_core::{Cart, CartId};
use moka::future::Cache;

/// Maximum number of carts kept in memory.
const MAX_CARTS: u64 = 10_000;

/// Cart snapshots keyed by cart ID.
#[derive(Clone)]
pub struct CartCache {
    inner: Cache<CartId, Cart>,
}

impl CartCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(MAX_CARTS)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, cart_id: &CartId) -> Option<Cart> {
        self.inner.get(cart_id).await
    }

    pub async fn insert(&self, cart: &Cart) {
        self.inner.insert(cart.id.clone(), cart.clone()).await;
    }

    pub async fn invalidate(&self, cart_id: &CartId) {
        self.inner.invalidate(cart_id).await;
    }
}
