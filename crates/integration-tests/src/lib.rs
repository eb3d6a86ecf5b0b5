//! Integration tests for Larder.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p larder-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `reconciliation_flows` - Login merge, checkout return and background
//!   merge supervision, driven through the public `larder-storefront` API
//!   against the in-memory service fakes from its `testing` feature
//!
//! No database or Shopify credentials are needed.
