//! Cart type conversion functions.
//!
//! Every cart operation selects the same `CartFields` fragment, so a single
//! conversion covers queries and mutations alike.

use std::collections::BTreeMap;
use std::str::FromStr;

use larder_core::{
    BuyerIdentity, BuyerIdentityInput, Cart, CartCost, CartCreateInput, CartCustomer, CartId,
    CartLine, CartLineId, CartLineInput, CustomerId, DiscountCode, MerchandiseId, Money,
};
use rust_decimal::Decimal;
use tracing::warn;

use crate::shopify::types::{
    AttributeInput, CartBuyerIdentityFields, CartBuyerIdentityInputVars, CartFields,
    CartInputVars, CartLineFields, CartLineInputVars, CartLineUpdate, CartLineUpdateInputVars,
    MoneyV2,
};

// =============================================================================
// Response -> Domain
// =============================================================================

/// Convert the `CartFields` fragment into a cart snapshot.
pub fn convert_cart(cart: CartFields) -> Cart {
    Cart {
        id: CartId::new(cart.id),
        checkout_url: cart.checkout_url,
        total_quantity: cart.total_quantity,
        lines: cart
            .lines
            .edges
            .into_iter()
            .map(|edge| convert_cart_line(edge.node))
            .collect(),
        buyer_identity: cart
            .buyer_identity
            .map(convert_buyer_identity)
            .unwrap_or_default(),
        discount_codes: cart
            .discount_codes
            .into_iter()
            .map(|d| DiscountCode {
                code: d.code,
                applicable: d.applicable,
            })
            .collect(),
        cost: CartCost {
            subtotal: convert_money(cart.cost.subtotal_amount),
            total: convert_money(cart.cost.total_amount),
        },
    }
}

/// Convert a cart line.
///
/// A line without merchandise keeps an empty merchandise id; it is flagged as
/// invalid cart state when something tries to copy it.
fn convert_cart_line(line: CartLineFields) -> CartLine {
    let merchandise = line.merchandise.unwrap_or_default();
    if merchandise.id.is_none() {
        warn!(line_id = %line.id, "Cart line has no merchandise id");
    }
    let product = merchandise.product.unwrap_or_default();

    CartLine {
        id: CartLineId::new(line.id),
        merchandise_id: MerchandiseId::new(merchandise.id.unwrap_or_default()),
        quantity: line.quantity,
        attributes: line
            .attributes
            .into_iter()
            .map(|a| (a.key, a.value.unwrap_or_default()))
            .collect::<BTreeMap<_, _>>(),
        title: product.title,
        variant_title: merchandise.title.filter(|t| t != "Default Title"),
    }
}

fn convert_buyer_identity(b: CartBuyerIdentityFields) -> BuyerIdentity {
    BuyerIdentity {
        customer: b.customer.map(|c| CartCustomer {
            id: CustomerId::new(c.id),
            email: c.email,
        }),
        email: b.email,
        country_code: b.country_code,
    }
}

fn convert_money(money: MoneyV2) -> Money {
    let amount = Decimal::from_str(&money.amount).unwrap_or_else(|e| {
        warn!(amount = %money.amount, error = %e, "Unparseable money amount, using zero");
        Decimal::ZERO
    });
    Money::new(amount, money.currency_code)
}

// =============================================================================
// Domain -> Input
// =============================================================================

/// Convert a line input into mutation variables.
pub fn convert_line_input(line: CartLineInput) -> CartLineInputVars {
    CartLineInputVars {
        merchandise_id: line.merchandise_id.into(),
        quantity: i64::from(line.quantity),
        attributes: line
            .attributes
            .into_iter()
            .map(|(key, value)| AttributeInput { key, value })
            .collect(),
    }
}

/// Convert a line update into mutation variables.
pub fn convert_line_update(update: CartLineUpdate) -> CartLineUpdateInputVars {
    CartLineUpdateInputVars {
        id: update.id.into(),
        quantity: i64::from(update.quantity),
    }
}

/// Convert a buyer identity request into mutation variables.
///
/// This is the only place the raw customer access token is exposed.
pub fn convert_buyer_identity_input(identity: &BuyerIdentityInput) -> CartBuyerIdentityInputVars {
    CartBuyerIdentityInputVars {
        customer_access_token: identity
            .customer_access_token
            .as_ref()
            .map(|t| t.expose().to_string()),
        email: identity.email.clone(),
        country_code: identity.country_code.clone(),
    }
}

/// Convert a cart creation request into mutation variables.
pub fn convert_cart_create_input(input: CartCreateInput) -> CartInputVars {
    CartInputVars {
        lines: input.lines.into_iter().map(convert_line_input).collect(),
        discount_codes: input.discount_codes,
        buyer_identity: input
            .buyer_identity
            .as_ref()
            .map(convert_buyer_identity_input),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use larder_core::CustomerAccessToken;

    use super::*;

    fn fields(json: serde_json::Value) -> CartFields {
        serde_json::from_value(json).unwrap()
    }

    fn sample_cart_json() -> serde_json::Value {
        serde_json::json!({
            "id": "gid://shopify/Cart/c1",
            "checkoutUrl": "https://shop.example/cart/c/c1",
            "totalQuantity": 3,
            "buyerIdentity": {
                "email": "buyer@example.com",
                "countryCode": "AU",
                "customer": {"id": "gid://shopify/Customer/7", "email": "buyer@example.com"}
            },
            "cost": {
                "subtotalAmount": {"amount": "42.50", "currencyCode": "AUD"},
                "totalAmount": {"amount": "46.75", "currencyCode": "AUD"}
            },
            "discountCodes": [{"code": "HAMPER10", "applicable": true}],
            "lines": {"edges": [
                {"node": {
                    "id": "gid://shopify/CartLine/1",
                    "quantity": 2,
                    "attributes": [{"key": "_bundle_id", "value": "xmas"}],
                    "merchandise": {
                        "id": "gid://shopify/ProductVariant/11",
                        "title": "Default Title",
                        "product": {"title": "Pineapple Jam", "handle": "pineapple-jam"}
                    }
                }},
                {"node": {
                    "id": "gid://shopify/CartLine/2",
                    "quantity": 1,
                    "attributes": [],
                    "merchandise": {
                        "id": "gid://shopify/ProductVariant/12",
                        "title": "Large",
                        "product": {"title": "Hamper", "handle": "hamper"}
                    }
                }}
            ]}
        })
    }

    #[test]
    fn test_convert_cart() {
        let cart = convert_cart(fields(sample_cart_json()));

        assert_eq!(cart.id.as_str(), "gid://shopify/Cart/c1");
        assert_eq!(cart.total_quantity, 3);
        assert_eq!(cart.lines.len(), 2);
        assert!(cart.is_associated());
        assert_eq!(cart.cost.total.amount, Decimal::new(4675, 2));
        assert_eq!(cart.discount_code_strings(), vec!["HAMPER10"]);

        let first = cart.lines.first().unwrap();
        assert_eq!(first.merchandise_id.as_str(), "gid://shopify/ProductVariant/11");
        assert_eq!(first.variant_title, None);
        assert_eq!(
            first.attributes.get("_bundle_id").map(String::as_str),
            Some("xmas")
        );

        let second = cart.lines.get(1).unwrap();
        assert_eq!(second.variant_title.as_deref(), Some("Large"));
    }

    #[test]
    fn test_convert_anonymous_cart() {
        let mut json = sample_cart_json();
        json["buyerIdentity"] = serde_json::Value::Null;
        let cart = convert_cart(fields(json));
        assert!(!cart.is_associated());
    }

    #[test]
    fn test_line_without_merchandise_is_flagged_on_copy() {
        let mut json = sample_cart_json();
        json["lines"]["edges"][0]["node"]["merchandise"] = serde_json::Value::Null;
        let cart = convert_cart(fields(json));
        assert!(cart.line_inputs().is_err());
    }

    #[test]
    fn test_bad_money_falls_back_to_zero() {
        let mut json = sample_cart_json();
        json["cost"]["totalAmount"]["amount"] = serde_json::json!("not-a-number");
        let cart = convert_cart(fields(json));
        assert_eq!(cart.cost.total.amount, Decimal::ZERO);
    }

    #[test]
    fn test_convert_create_input_carries_token_and_attributes() {
        let mut line = CartLineInput::new("gid://shopify/ProductVariant/11", 2);
        line.attributes
            .insert("_bundle_id".to_string(), "xmas".to_string());
        let token = CustomerAccessToken::new("tok-1234").unwrap();

        let vars = convert_cart_create_input(CartCreateInput {
            lines: vec![line],
            discount_codes: vec!["HAMPER10".to_string()],
            buyer_identity: Some(BuyerIdentityInput::for_customer(token)),
        });

        let json = serde_json::to_value(&vars).unwrap();
        assert_eq!(json["lines"][0]["merchandiseId"], "gid://shopify/ProductVariant/11");
        assert_eq!(json["lines"][0]["quantity"], 2);
        assert_eq!(json["lines"][0]["attributes"][0]["key"], "_bundle_id");
        assert_eq!(json["discountCodes"][0], "HAMPER10");
        assert_eq!(json["buyerIdentity"]["customerAccessToken"], "tok-1234");
    }
}
