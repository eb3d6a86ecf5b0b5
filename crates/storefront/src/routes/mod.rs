//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Cart (JSON)
//! GET  /cart                   - Cart snapshot (checks for a checkout return first)
//! POST /cart/add               - Add to cart (creates the cart if needed)
//! POST /cart/update            - Update line quantity
//! POST /cart/remove            - Remove line
//! GET  /cart/count             - Cart item count
//! POST /cart/merge             - Merge the cart with the signed-in customer now
//! GET  /cart/sync              - Passive checkout-return check
//!
//! # Checkout
//! GET  /checkout               - Record checkout start, redirect to Shopify checkout
//!
//! # Shopify Customer OAuth
//! GET  /auth/shopify/login     - Redirect to Shopify OAuth
//! GET  /auth/shopify/callback  - Handle OAuth callback, start background cart merge
//! POST /auth/shopify/logout    - Logout from Shopify
//! ```

pub mod cart;
pub mod shopify_auth;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/shopify/login", get(shopify_auth::login))
        .route("/shopify/callback", get(shopify_auth::callback))
        .route("/shopify/logout", post(shopify_auth::logout))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
        .route("/merge", post(cart::merge))
        .route("/sync", get(cart::sync))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .route("/checkout", get(cart::checkout))
        .nest("/auth", auth_routes())
}
