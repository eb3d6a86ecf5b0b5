//! Cart identity reconciliation.
//!
//! Keeps the session's cart consistent with the customer's identity across
//! three events:
//!
//! - **Login**: [`CartMergeCoordinator::merge_on_login`], run in the
//!   background by [`MergeSupervisor`] from the OAuth callback
//! - **Explicit merge**: the same coordinator, awaited by `POST /cart/merge`
//! - **Checkout return**: [`CheckoutReturnDetector::detect_and_refresh`]
//!
//! Every flow returns a [`ReconciliationResult`]; none of them return `Err`
//! to the route layer. The cart reference travels as an explicit
//! [`CartContext`] and is only replaced after a successful reconciliation.
//!
//! ```text
//! Login ──► CartMergeCoordinator ──► CartSnapshotReader ─┐
//!                 │                                      ├─► CartService
//!                 └────────────► CustomerAssociator ─────┘
//!
//! Page load ──► CheckoutReturnDetector ──► recreate / re-read ──► CartService
//! ```
//!
//! [`ReconciliationResult`]: larder_core::ReconciliationResult

pub mod adapters;
pub mod associate;
pub mod checkout_return;
pub mod context;
pub mod merge;
pub mod services;
pub mod snapshot;
pub mod supervisor;
pub mod timeout;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapters::{SessionIdentity, ShopifyCartService};
pub use associate::CustomerAssociator;
pub use checkout_return::{
    CheckoutMarker, CheckoutReturnDetector, DisplayedCart, RefererDetector, RefreshOutcome,
    RequestMetadata, ReturnDetector, should_force_refresh,
};
pub use context::{CartChange, CartContext};
pub use merge::CartMergeCoordinator;
pub use services::{
    CartPayload, CartService, IdentityError, IdentityService, ProviderError, ServiceError,
};
pub use snapshot::CartSnapshotReader;
pub use supervisor::{MergeReport, MergeSupervisor};
