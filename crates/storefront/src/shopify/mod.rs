//! Shopify Storefront and Customer Account API clients.
//!
//! # Architecture
//!
//! - Uses `graphql_client` request/response envelopes with hand-written
//!   operation documents (see [`storefront::queries`])
//! - Shopify is source of truth - NO local sync, direct API calls
//! - Cart reads used for display may be served from a short-lived `moka`
//!   cache; reconciliation always bypasses it
//!
//! # APIs
//!
//! ## Storefront API
//! - Cart reads and mutations, including buyer identity updates
//! - Private access token for server-side operations
//!
//! ## Customer Account API
//! - OAuth authentication flow (authorize, code exchange, refresh, logout)
//!
//! # Example
//!
//! ```rust,ignore
//! use larder_storefront::shopify::{FetchPolicy, StorefrontClient};
//!
//! let client = StorefrontClient::new(&config.shopify, Duration::from_secs(8))?;
//!
//! let payload = client.create_cart(CartCreateInput {
//!     lines: vec![CartLineInput::new("gid://shopify/ProductVariant/1", 2)],
//!     ..CartCreateInput::default()
//! }).await?;
//!
//! let cart = client.get_cart(&cart_id, FetchPolicy::BypassCache).await?;
//! ```

pub mod customer;
pub mod storefront;
pub mod types;

pub use customer::{CustomerClient, CustomerTokens};
pub use storefront::{FetchPolicy, StorefrontClient};
pub use types::*;

use thiserror::Error;

/// Errors that can occur when interacting with Shopify APIs.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Shopify answered with a server error.
    #[error("Shopify unavailable: HTTP {0}")]
    Unavailable(u16),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// User error from mutation (e.g., invalid input).
    #[error("User error: {0}")]
    UserError(String),

    /// Customer Account OAuth flow failed.
    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl ShopifyError {
    /// Whether the failure is in transport rather than a definitive answer
    /// from Shopify.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimited(_) | Self::Unavailable(_)
        )
    }
}

/// A GraphQL error returned by the Shopify API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

impl GraphQLError {
    /// An error with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: vec![],
            path: vec![],
        }
    }
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut parts = Vec::new();

            if !e.message.is_empty() {
                parts.push(e.message.clone());
            }

            if !e.path.is_empty() {
                let path_str = e
                    .path
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                parts.push(format!("path: {path_str}"));
            }

            if let Some(loc) = e.locations.first() {
                parts.push(format!("at line {}:{}", loc.line, loc.column));
            }

            if parts.is_empty() {
                format!("[error {}]: (no details)", i + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
