//! Type conversion functions for Shopify Storefront API responses.

pub mod cart;

pub use cart::{
    convert_buyer_identity_input, convert_cart, convert_cart_create_input, convert_line_input,
    convert_line_update,
};
