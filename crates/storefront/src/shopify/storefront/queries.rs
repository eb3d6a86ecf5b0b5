//! GraphQL operation definitions for Shopify Storefront API cart operations.
//!
//! Each operation is a unit struct implementing [`GraphQLQuery`] with a
//! sibling module holding its `Variables` and `ResponseData`, the same shape
//! `graphql_client` generates, so `StorefrontClient::execute` stays generic.

use graphql_client::{GraphQLQuery, QueryBody};
use serde::{Deserialize, Serialize};

use crate::shopify::types::{
    CartFields, CartInputVars, CartLineInputVars, CartLineUpdateInputVars, CartPayloadFields,
    CartBuyerIdentityInputVars,
};

/// Fragment selected by every cart operation.
macro_rules! cart_fragment {
    () => {
        r"
fragment CartFields on Cart {
  id
  checkoutUrl
  totalQuantity
  buyerIdentity {
    email
    countryCode
    customer { id email }
  }
  cost {
    subtotalAmount { amount currencyCode }
    totalAmount { amount currencyCode }
  }
  discountCodes { code applicable }
  lines(first: 250) {
    edges {
      node {
        id
        quantity
        attributes { key value }
        merchandise {
          ... on ProductVariant {
            id
            title
            product { title handle }
          }
        }
      }
    }
  }
}
"
    };
}

/// Selection for cart mutation payloads.
macro_rules! cart_payload {
    () => {
        "cart { ...CartFields } userErrors { code field message }"
    };
}

/// Implement [`GraphQLQuery`] for an operation struct.
macro_rules! storefront_operation {
    ($op:ident, $module:ident, $name:literal, $document:expr) => {
        impl GraphQLQuery for $op {
            type Variables = $module::Variables;
            type ResponseData = $module::ResponseData;

            fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
                QueryBody {
                    variables,
                    query: $document,
                    operation_name: $name,
                }
            }
        }
    };
}

// =============================================================================
// Queries
// =============================================================================

pub struct GetCart;

pub mod get_cart {
    use super::{CartFields, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub cart: Option<CartFields>,
    }
}

storefront_operation!(
    GetCart,
    get_cart,
    "GetCart",
    concat!(
        "query GetCart($cartId: ID!) { cart(id: $cartId) { ...CartFields } }",
        cart_fragment!()
    )
);

// =============================================================================
// Mutations
// =============================================================================

pub struct CreateCart;

pub mod create_cart {
    use super::{CartInputVars, CartPayloadFields, Deserialize, Serialize};

    #[derive(Clone, Serialize)]
    pub struct Variables {
        pub input: CartInputVars,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_create: Option<CartPayloadFields>,
    }
}

storefront_operation!(
    CreateCart,
    create_cart,
    "CreateCart",
    concat!(
        "mutation CreateCart($input: CartInput!) { cartCreate(input: $input) { ",
        cart_payload!(),
        " } }",
        cart_fragment!()
    )
);

pub struct AddToCart;

pub mod add_to_cart {
    use super::{CartLineInputVars, CartPayloadFields, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        pub lines: Vec<CartLineInputVars>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_lines_add: Option<CartPayloadFields>,
    }
}

storefront_operation!(
    AddToCart,
    add_to_cart,
    "AddToCart",
    concat!(
        "mutation AddToCart($cartId: ID!, $lines: [CartLineInput!]!) { ",
        "cartLinesAdd(cartId: $cartId, lines: $lines) { ",
        cart_payload!(),
        " } }",
        cart_fragment!()
    )
);

pub struct UpdateCartLines;

pub mod update_cart_lines {
    use super::{CartLineUpdateInputVars, CartPayloadFields, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        pub lines: Vec<CartLineUpdateInputVars>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_lines_update: Option<CartPayloadFields>,
    }
}

storefront_operation!(
    UpdateCartLines,
    update_cart_lines,
    "UpdateCartLines",
    concat!(
        "mutation UpdateCartLines($cartId: ID!, $lines: [CartLineUpdateInput!]!) { ",
        "cartLinesUpdate(cartId: $cartId, lines: $lines) { ",
        cart_payload!(),
        " } }",
        cart_fragment!()
    )
);

pub struct RemoveFromCart;

pub mod remove_from_cart {
    use super::{CartPayloadFields, Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        pub line_ids: Vec<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_lines_remove: Option<CartPayloadFields>,
    }
}

storefront_operation!(
    RemoveFromCart,
    remove_from_cart,
    "RemoveFromCart",
    concat!(
        "mutation RemoveFromCart($cartId: ID!, $lineIds: [ID!]!) { ",
        "cartLinesRemove(cartId: $cartId, lineIds: $lineIds) { ",
        cart_payload!(),
        " } }",
        cart_fragment!()
    )
);

pub struct UpdateBuyerIdentity;

pub mod update_buyer_identity {
    use super::{CartBuyerIdentityInputVars, CartPayloadFields, Deserialize, Serialize};

    #[derive(Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Variables {
        pub cart_id: String,
        pub buyer_identity: CartBuyerIdentityInputVars,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ResponseData {
        pub cart_buyer_identity_update: Option<CartPayloadFields>,
    }
}

storefront_operation!(
    UpdateBuyerIdentity,
    update_buyer_identity,
    "UpdateBuyerIdentity",
    concat!(
        "mutation UpdateBuyerIdentity($cartId: ID!, $buyerIdentity: CartBuyerIdentityInput!) { ",
        "cartBuyerIdentityUpdate(cartId: $cartId, buyerIdentity: $buyerIdentity) { ",
        cart_payload!(),
        " } }",
        cart_fragment!()
    )
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cart_query_body() {
        let body = GetCart::build_query(get_cart::Variables {
            cart_id: "gid://shopify/Cart/1".to_string(),
        });
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["operationName"], "GetCart");
        assert_eq!(json["variables"]["cartId"], "gid://shopify/Cart/1");
        let query = json["query"].as_str().unwrap();
        assert!(query.contains("fragment CartFields on Cart"));
        assert!(query.contains("cart(id: $cartId)"));
    }

    #[test]
    fn test_buyer_identity_mutation_selects_user_errors() {
        let body = UpdateBuyerIdentity::build_query(update_buyer_identity::Variables {
            cart_id: "gid://shopify/Cart/1".to_string(),
            buyer_identity: CartBuyerIdentityInputVars::default(),
        });
        assert!(body.query.contains("cartBuyerIdentityUpdate"));
        assert!(body.query.contains("userErrors { code field message }"));
    }

    #[test]
    fn test_create_cart_response_parses() {
        let json = serde_json::json!({
            "cartCreate": {
                "cart": null,
                "userErrors": [{"code": "INVALID", "field": ["input", "lines"], "message": "bad line"}]
            }
        });
        let data: create_cart::ResponseData = serde_json::from_value(json).unwrap();
        let payload = data.cart_create.unwrap();
        assert!(payload.cart.is_none());
        assert_eq!(payload.user_errors.len(), 1);
    }
}
