//! Session-backed models for the storefront.

pub mod session;

pub use session::keys as session_keys;
pub use session::{
    commit_cart_context, load_cart_context, mark_checkout_started, take_checkout_marker,
};
