//! Cart snapshot types.
//!
//! A [`Cart`] is a transient snapshot of the remote cart resource. The
//! storefront never holds a durable copy; it reads one, acts on it, and lets
//! it go.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::{CartId, CartLineId, CustomerId, MerchandiseId};
use super::money::Money;
use super::token::CustomerAccessToken;

/// The customer a cart is associated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCustomer {
    /// Shopify customer ID.
    pub id: CustomerId,
    /// Customer email, if the provider exposes it.
    pub email: Option<String>,
}

/// Buyer identity attached to a cart.
///
/// Anonymous carts have no `customer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerIdentity {
    /// Associated customer, if any.
    pub customer: Option<CartCustomer>,
    /// Buyer email.
    pub email: Option<String>,
    /// ISO 3166 country code used for localized pricing.
    pub country_code: Option<String>,
}

impl BuyerIdentity {
    /// Whether this identity is bound to a customer account.
    #[must_use]
    pub const fn is_associated(&self) -> bool {
        self.customer.is_some()
    }
}

/// Cost summary of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCost {
    /// Subtotal before tax and shipping.
    pub subtotal: Money,
    /// Total amount.
    pub total: Money,
}

/// A discount code applied to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    /// The code as entered.
    pub code: String,
    /// Whether the code currently applies to the cart.
    pub applicable: bool,
}

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Cart line ID (only meaningful within its cart).
    pub id: CartLineId,
    /// Product variant reference.
    pub merchandise_id: MerchandiseId,
    /// Quantity as reported by the provider.
    ///
    /// Kept signed so malformed provider data can be detected rather than
    /// silently clamped.
    pub quantity: i64,
    /// Line attributes (bundle provenance and other bookkeeping).
    pub attributes: BTreeMap<String, String>,
    /// Product title for display.
    pub title: String,
    /// Variant title for display.
    pub variant_title: Option<String>,
}

/// Why a cart line cannot be copied into a new cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidLine {
    /// The line has no merchandise reference.
    #[error("line {line_id} has no merchandise id")]
    MissingMerchandise { line_id: CartLineId },
    /// The line quantity is zero or negative.
    #[error("line {line_id} has non-positive quantity {quantity}")]
    NonPositiveQuantity { line_id: CartLineId, quantity: i64 },
    /// The quantity does not fit the provider's input type.
    #[error("line {line_id} quantity {quantity} is out of range")]
    QuantityOutOfRange { line_id: CartLineId, quantity: i64 },
}

impl CartLine {
    /// Build the input needed to recreate this line in a fresh cart.
    ///
    /// Attributes are carried over so bundle provenance survives a merge.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLine`] when the merchandise reference is missing or
    /// the quantity is not a positive integer.
    pub fn to_input(&self) -> Result<CartLineInput, InvalidLine> {
        if self.merchandise_id.is_blank() {
            return Err(InvalidLine::MissingMerchandise {
                line_id: self.id.clone(),
            });
        }
        if self.quantity <= 0 {
            return Err(InvalidLine::NonPositiveQuantity {
                line_id: self.id.clone(),
                quantity: self.quantity,
            });
        }
        let quantity =
            u32::try_from(self.quantity).map_err(|_| InvalidLine::QuantityOutOfRange {
                line_id: self.id.clone(),
                quantity: self.quantity,
            })?;

        Ok(CartLineInput {
            merchandise_id: self.merchandise_id.clone(),
            quantity,
            attributes: self.attributes.clone(),
        })
    }
}

/// A snapshot of a remote cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Cart ID.
    pub id: CartId,
    /// Hosted checkout URL.
    pub checkout_url: String,
    /// Total item quantity across all lines.
    pub total_quantity: i64,
    /// Lines in display order.
    pub lines: Vec<CartLine>,
    /// Buyer identity.
    pub buyer_identity: BuyerIdentity,
    /// Applied discount codes in display order.
    pub discount_codes: Vec<DiscountCode>,
    /// Cost summary.
    pub cost: CartCost,
}

impl Cart {
    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the cart is bound to a customer account.
    #[must_use]
    pub const fn is_associated(&self) -> bool {
        self.buyer_identity.is_associated()
    }

    /// Discount codes as plain strings, preserving display order.
    #[must_use]
    pub fn discount_code_strings(&self) -> Vec<String> {
        self.discount_codes.iter().map(|d| d.code.clone()).collect()
    }

    /// Convert every line into creation input.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidLine`] encountered; a partial copy is never
    /// returned because it would drop items from the customer's cart.
    pub fn line_inputs(&self) -> Result<Vec<CartLineInput>, InvalidLine> {
        self.lines.iter().map(CartLine::to_input).collect()
    }
}

/// Input for a line of a new cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineInput {
    /// Product variant reference.
    pub merchandise_id: MerchandiseId,
    /// Positive quantity.
    pub quantity: u32,
    /// Line attributes.
    pub attributes: BTreeMap<String, String>,
}

impl CartLineInput {
    /// A line with no attributes.
    #[must_use]
    pub fn new(merchandise_id: impl Into<MerchandiseId>, quantity: u32) -> Self {
        Self {
            merchandise_id: merchandise_id.into(),
            quantity,
            attributes: BTreeMap::new(),
        }
    }
}

/// Buyer identity requested when creating or updating a cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuyerIdentityInput {
    /// Customer access token to bind the cart to.
    pub customer_access_token: Option<CustomerAccessToken>,
    /// Buyer email.
    pub email: Option<String>,
    /// ISO 3166 country code.
    pub country_code: Option<String>,
}

impl BuyerIdentityInput {
    /// Identity bound to a customer token.
    #[must_use]
    pub fn for_customer(token: CustomerAccessToken) -> Self {
        Self {
            customer_access_token: Some(token),
            ..Self::default()
        }
    }
}

/// Everything needed to create a cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartCreateInput {
    /// Lines to seed the cart with.
    pub lines: Vec<CartLineInput>,
    /// Discount codes to apply.
    pub discount_codes: Vec<String>,
    /// Buyer identity to attach.
    pub buyer_identity: Option<BuyerIdentityInput>,
}
