//! The current cart reference, passed explicitly through a request.

use larder_core::CartId;

/// A pending change to the session's cart reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    /// Point the session at a different cart.
    Replaced(CartId),
    /// The cart is gone; drop the reference.
    Cleared,
}

/// Which cart this request is working with.
///
/// Loaded from the session at the start of a flow and committed back at the
/// end. Flows only call [`CartContext::replace`] after a successful
/// reconciliation, so a failed flow leaves the session untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartContext {
    cart_id: Option<CartId>,
    change: Option<CartChange>,
}

impl CartContext {
    /// Context for the cart currently referenced by the session.
    #[must_use]
    pub const fn new(cart_id: Option<CartId>) -> Self {
        Self {
            cart_id,
            change: None,
        }
    }

    /// The current cart ID, if any.
    #[must_use]
    pub const fn cart_id(&self) -> Option<&CartId> {
        self.cart_id.as_ref()
    }

    /// Point the context at `cart_id`. A no-op if it already does.
    pub fn replace(&mut self, cart_id: CartId) {
        if self.cart_id.as_ref() == Some(&cart_id) {
            return;
        }
        self.change = Some(CartChange::Replaced(cart_id.clone()));
        self.cart_id = Some(cart_id);
    }

    /// Drop the cart reference.
    pub fn clear(&mut self) {
        if self.cart_id.take().is_some() {
            self.change = Some(CartChange::Cleared);
        }
    }

    /// The change to persist, if the reference moved.
    #[must_use]
    pub const fn pending_change(&self) -> Option<&CartChange> {
        self.change.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_records_change() {
        let mut ctx = CartContext::new(Some(CartId::new("old")));
        ctx.replace(CartId::new("new"));
        assert_eq!(ctx.cart_id().map(CartId::as_str), Some("new"));
        assert_eq!(
            ctx.pending_change(),
            Some(&CartChange::Replaced(CartId::new("new")))
        );
    }

    #[test]
    fn test_replace_with_same_id_is_noop() {
        let mut ctx = CartContext::new(Some(CartId::new("same")));
        ctx.replace(CartId::new("same"));
        assert!(ctx.pending_change().is_none());
    }

    #[test]
    fn test_clear() {
        let mut ctx = CartContext::new(Some(CartId::new("gone")));
        ctx.clear();
        assert!(ctx.cart_id().is_none());
        assert_eq!(ctx.pending_change(), Some(&CartChange::Cleared));

        let mut empty = CartContext::default();
        empty.clear();
        assert!(empty.pending_change().is_none());
    }
}
