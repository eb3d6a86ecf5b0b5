//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions with `PostgreSQL` store)

pub mod session;
pub mod shopify_customer;

pub use session::create_session_layer;
pub use shopify_customer::{
    OptionalShopifyCustomer, clear_shopify_customer_tokens, set_shopify_customer_tokens,
};
