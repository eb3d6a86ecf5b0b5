//! Raw Storefront API types.
//!
//! These mirror the JSON shapes of the cart operations in
//! [`super::storefront::queries`]. Conversions into the `larder_core`
//! domain types live in `storefront::conversions`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Response Types
// =============================================================================

/// Monetary amount as returned by the API (decimal string).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyV2 {
    /// Decimal amount as string (preserves precision).
    pub amount: String,
    /// ISO 4217 currency code.
    pub currency_code: String,
}

/// Custom attribute (key-value pair).
#[derive(Debug, Clone, Deserialize)]
pub struct Attribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: Option<String>,
}

/// Product info nested in cart merchandise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MerchandiseProduct {
    /// Product title.
    #[serde(default)]
    pub title: String,
    /// Product handle.
    #[serde(default)]
    pub handle: String,
}

/// Merchandise (product variant) in a cart line.
///
/// Every field is optional so malformed lines deserialize and can be
/// reported as invalid cart state instead of failing the whole read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MerchandiseFields {
    /// Variant ID.
    pub id: Option<String>,
    /// Variant title.
    pub title: Option<String>,
    /// Parent product.
    pub product: Option<MerchandiseProduct>,
}

/// A line item in the cart.
#[derive(Debug, Clone, Deserialize)]
pub struct CartLineFields {
    /// Cart line ID.
    pub id: String,
    /// Quantity.
    pub quantity: i64,
    /// Custom attributes.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Product variant.
    #[serde(default)]
    pub merchandise: Option<MerchandiseFields>,
}

/// Edge wrapper for cart lines.
#[derive(Debug, Clone, Deserialize)]
pub struct CartLineEdge {
    /// The line.
    pub node: CartLineFields,
}

/// Connection of cart lines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartLineConnection {
    /// Edges.
    #[serde(default)]
    pub edges: Vec<CartLineEdge>,
}

/// Customer in buyer identity.
#[derive(Debug, Clone, Deserialize)]
pub struct CartCustomerFields {
    /// Customer ID.
    pub id: String,
    /// Email.
    pub email: Option<String>,
}

/// Buyer identity for the cart.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBuyerIdentityFields {
    /// Email address.
    pub email: Option<String>,
    /// Country code.
    pub country_code: Option<String>,
    /// Logged-in customer.
    pub customer: Option<CartCustomerFields>,
}

/// Cart cost summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCostFields {
    /// Subtotal before tax/shipping.
    pub subtotal_amount: MoneyV2,
    /// Total amount.
    pub total_amount: MoneyV2,
}

/// Discount code applied to cart.
#[derive(Debug, Clone, Deserialize)]
pub struct CartDiscountCodeFields {
    /// The discount code.
    pub code: String,
    /// Whether the code is applicable.
    pub applicable: bool,
}

/// The `CartFields` fragment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartFields {
    /// Cart ID.
    pub id: String,
    /// Checkout URL.
    pub checkout_url: String,
    /// Total item quantity.
    pub total_quantity: i64,
    /// Buyer identity.
    #[serde(default)]
    pub buyer_identity: Option<CartBuyerIdentityFields>,
    /// Cart cost summary.
    pub cost: CartCostFields,
    /// Applied discount codes.
    #[serde(default)]
    pub discount_codes: Vec<CartDiscountCodeFields>,
    /// Cart lines.
    #[serde(default)]
    pub lines: CartLineConnection,
}

/// User error from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CartUserError {
    /// Error code.
    pub code: Option<String>,
    /// Field path that caused the error.
    pub field: Option<Vec<String>>,
    /// Human-readable error message.
    pub message: String,
}

/// Payload shared by every cart mutation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartPayloadFields {
    /// The cart after the mutation.
    pub cart: Option<CartFields>,
    /// Errors reported by the mutation.
    #[serde(default)]
    pub user_errors: Vec<CartUserError>,
}

// =============================================================================
// Input Types
// =============================================================================
//
// Input types that can carry a customer access token intentionally do not
// derive `Debug`.

/// Attribute input.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeInput {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: String,
}

/// Line input for `cartCreate` and `cartLinesAdd`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInputVars {
    /// Product variant ID.
    pub merchandise_id: String,
    /// Quantity to add.
    pub quantity: i64,
    /// Custom attributes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeInput>,
}

/// Line update input for `cartLinesUpdate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineUpdateInputVars {
    /// Cart line ID.
    pub id: String,
    /// New quantity.
    pub quantity: i64,
}

/// Buyer identity input.
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBuyerIdentityInputVars {
    /// Customer access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_access_token: Option<String>,
    /// Email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Country code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// Input for `cartCreate`.
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartInputVars {
    /// Lines.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<CartLineInputVars>,
    /// Discount codes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discount_codes: Vec<String>,
    /// Buyer identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_identity: Option<CartBuyerIdentityInputVars>,
}

/// Line update requested by the cart routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineUpdate {
    /// Cart line ID.
    pub id: larder_core::CartLineId,
    /// New quantity.
    pub quantity: u32,
}
