//! Larder storefront library.
//!
//! Serves the cart API and keeps the session's Shopify cart reconciled with
//! the customer's identity across login and checkout returns. Exposed as a
//! library so the reconciliation flows can be exercised from test crates.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod reconcile;
pub mod routes;
pub mod shopify;
pub mod state;
