//! Service seams for the remote cart and identity providers.
//!
//! Reconciliation only talks to these traits. Production wires them to the
//! Shopify clients in [`super::adapters`]; tests use the in-memory fakes in
//! `reconcile::testing`.

use std::time::Duration;

use async_trait::async_trait;
use larder_core::{
    BuyerIdentityInput, Cart, CartCreateInput, CartId, CustomerAccessToken, ErrorKind,
};
use thiserror::Error;

// =============================================================================
// Cart Service
// =============================================================================

/// Failure to get an answer from a service at all.
///
/// A provider that answers with `userErrors` is not a `ServiceError`; those
/// travel as data in [`CartPayload::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Network, rate limit or upstream outage.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The call did not complete within its time limit.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered with data we could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Reconciliation failure kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) => ErrorKind::TransientFetch,
            Self::Malformed(_) => ErrorKind::InvalidCartState,
        }
    }
}

/// An error reported by the provider alongside an otherwise successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code, if any.
    pub code: Option<String>,
    /// Input field path the error refers to.
    pub field: Option<Vec<String>>,
}

impl ProviderError {
    /// An error with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            field: None,
        }
    }
}

/// Response of a cart mutation: `{cart, errors[]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartPayload {
    /// The cart after the mutation.
    pub cart: Option<Cart>,
    /// Provider-reported errors. Non-empty means the mutation failed.
    pub errors: Vec<ProviderError>,
}

impl CartPayload {
    /// Whether the provider reported any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Provider error messages joined for logging.
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// The remote cart resource.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Read a cart. `Ok(None)` means the provider no longer knows it.
    async fn get(&self, cart_id: &CartId) -> Result<Option<Cart>, ServiceError>;

    /// Create a cart seeded with lines, discount codes and buyer identity.
    async fn create(&self, input: CartCreateInput) -> Result<CartPayload, ServiceError>;

    /// Replace the buyer identity of an existing cart.
    async fn update_buyer_identity(
        &self,
        cart_id: &CartId,
        identity: BuyerIdentityInput,
    ) -> Result<CartPayload, ServiceError>;
}

// =============================================================================
// Identity Service
// =============================================================================

/// Failure to obtain a customer access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// No customer is signed in.
    #[error("customer is not logged in")]
    NotLoggedIn,

    /// The customer was signed in but the token can no longer be used.
    #[error("customer session expired: {0}")]
    Expired(String),

    /// The identity provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    Transport(String),
}

impl IdentityError {
    /// Reconciliation failure kind for this error.
    ///
    /// A provider outage is worth retrying; a missing or dead session is not.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::TransientFetch,
            Self::NotLoggedIn | Self::Expired(_) => ErrorKind::NotAuthenticated,
        }
    }
}

/// The customer's login state.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Whether a customer is signed in. Reads local state only.
    async fn is_logged_in(&self) -> bool;

    /// A usable access token for the signed-in customer.
    async fn access_token(&self) -> Result<CustomerAccessToken, IdentityError>;
}
