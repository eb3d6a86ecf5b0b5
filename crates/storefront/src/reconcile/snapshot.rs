//! Read-only access to the current cart.

use std::sync::Arc;
use std::time::Duration;

use larder_core::{Cart, ErrorKind};
use tracing::{debug, instrument, warn};

use super::context::CartContext;
use super::services::CartService;
use super::timeout::bounded;

/// Fetches the authoritative state of the session's cart.
///
/// Every read goes to the provider; nothing is cached between calls.
#[derive(Clone)]
pub struct CartSnapshotReader {
    carts: Arc<dyn CartService>,
    timeout: Duration,
}

impl CartSnapshotReader {
    #[must_use]
    pub fn new(carts: Arc<dyn CartService>, timeout: Duration) -> Self {
        Self { carts, timeout }
    }

    /// Read the cart referenced by `ctx`.
    ///
    /// Returns `Ok(None)` when the context has no cart or the provider no
    /// longer knows it.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::TransientFetch`] on outage or timeout and
    /// [`ErrorKind::InvalidCartState`] when the response cannot be read.
    #[instrument(skip_all, fields(cart_id = ctx.cart_id().map_or("-", |id| id.as_str())))]
    pub async fn read(&self, ctx: &CartContext) -> Result<Option<Cart>, ErrorKind> {
        let Some(cart_id) = ctx.cart_id() else {
            debug!("No cart in context");
            return Ok(None);
        };

        match bounded(self.timeout, "cart.get", self.carts.get(cart_id)).await {
            Ok(cart) => Ok(cart),
            Err(e) => {
                warn!(error = %e, "Failed to read cart");
                Err(e.kind())
            }
        }
    }
}
