//! Outcome of a cart reconciliation flow.
//!
//! [`ReconciliationResult`] is the only reconciliation type that crosses into
//! the UI layer. It carries a coarse [`ErrorKind`] and never a raw provider
//! error.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::cart::Cart;

/// Why a reconciliation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The customer is not logged in. A valid terminal state, not an error.
    NotAuthenticated,
    /// Network failure, provider outage, or timeout. Safe to retry later.
    TransientFetch,
    /// The provider rejected binding the customer to the cart.
    AssociationFailed,
    /// The provider rejected recreating the cart for the customer.
    MergeFailed,
    /// Cart data is malformed (missing merchandise, bad quantity).
    InvalidCartState,
}

impl ErrorKind {
    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientFetch)
    }

    /// Whether this kind represents a genuine failure (as opposed to the
    /// customer simply not being logged in).
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::NotAuthenticated)
    }

    /// Stable name, identical to the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NotAuthenticated",
            Self::TransientFetch => "TransientFetch",
            Self::AssociationFailed => "AssociationFailed",
            Self::MergeFailed => "MergeFailed",
            Self::InvalidCartState => "InvalidCartState",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform outcome of login merge, explicit merge, and checkout-return
/// refresh.
///
/// Serializes as `{"success": true, "cart": ...}` or
/// `{"success": false, "reason": "...", "cart": ... | null}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationResult {
    /// The cart is reconciled with the customer's identity.
    Success {
        /// The reconciled cart.
        cart: Cart,
    },
    /// The reconciliation did not complete.
    Failure {
        /// Why it did not complete.
        reason: ErrorKind,
        /// The last known good cart, so the UI never shows fewer items than
        /// the customer actually has.
        cart: Option<Cart>,
    },
}

impl ReconciliationResult {
    /// A successful outcome.
    #[must_use]
    pub const fn success(cart: Cart) -> Self {
        Self::Success { cart }
    }

    /// A failed outcome.
    #[must_use]
    pub const fn failure(reason: ErrorKind, cart: Option<Cart>) -> Self {
        Self::Failure { reason, cart }
    }

    /// Whether the reconciliation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure reason, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason, .. } => Some(*reason),
        }
    }

    /// The cart carried by the outcome, if any.
    #[must_use]
    pub const fn cart(&self) -> Option<&Cart> {
        match self {
            Self::Success { cart } => Some(cart),
            Self::Failure { cart, .. } => cart.as_ref(),
        }
    }

    /// Consume the outcome and return its cart.
    #[must_use]
    pub fn into_cart(self) -> Option<Cart> {
        match self {
            Self::Success { cart } => Some(cart),
            Self::Failure { cart, .. } => cart,
        }
    }
}

impl Serialize for ReconciliationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success { cart } => {
                let mut state = serializer.serialize_struct("ReconciliationResult", 2)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("cart", cart)?;
                state.end()
            }
            Self::Failure { reason, cart } => {
                let mut state = serializer.serialize_struct("ReconciliationResult", 3)?;
                state.serialize_field("success", &false)?;
                state.serialize_field("reason", reason)?;
                state.serialize_field("cart", cart)?;
                state.end()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::types::{BuyerIdentity, CartCost, CartId, Money};

    fn empty_cart() -> Cart {
        Cart {
            id: CartId::new("gid://shopify/Cart/9"),
            checkout_url: "https://shop.example/checkouts/9".to_string(),
            total_quantity: 0,
            lines: vec![],
            buyer_identity: BuyerIdentity::default(),
            discount_codes: vec![],
            cost: CartCost {
                subtotal: Money::new(Decimal::ZERO, "USD"),
                total: Money::new(Decimal::ZERO, "USD"),
            },
        }
    }

    #[test]
    fn test_failure_serializes_reason_and_null_cart() {
        let result = ReconciliationResult::failure(ErrorKind::NotAuthenticated, None);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "NotAuthenticated");
        assert!(json["cart"].is_null());
    }

    #[test]
    fn test_success_serializes_cart_without_reason() {
        let result = ReconciliationResult::success(empty_cart());
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["cart"]["id"], "gid://shopify/Cart/9");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_accessors() {
        let ok = ReconciliationResult::success(empty_cart());
        assert!(ok.is_success());
        assert_eq!(ok.reason(), None);
        assert!(ok.cart().is_some());

        let failed = ReconciliationResult::failure(ErrorKind::MergeFailed, Some(empty_cart()));
        assert!(!failed.is_success());
        assert_eq!(failed.reason(), Some(ErrorKind::MergeFailed));
        assert_eq!(
            failed.into_cart().map(|c| c.id),
            Some(CartId::new("gid://shopify/Cart/9"))
        );
    }

    #[test]
    fn test_error_kind_classification() {
        assert!(ErrorKind::TransientFetch.is_retryable());
        assert!(!ErrorKind::AssociationFailed.is_retryable());
        assert!(!ErrorKind::NotAuthenticated.is_failure());
        assert!(ErrorKind::InvalidCartState.is_failure());
    }

    #[test]
    fn test_error_kind_display_matches_serialized_name() {
        for kind in [
            ErrorKind::NotAuthenticated,
            ErrorKind::TransientFetch,
            ErrorKind::AssociationFailed,
            ErrorKind::MergeFailed,
            ErrorKind::InvalidCartState,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.to_string());
        }
    }
}
