//! Core types for Larder.
//!
//! This module provides type-safe wrappers for the cart reconciliation domain.

pub mod cart;
pub mod id;
pub mod money;
pub mod reconcile;
pub mod token;

pub use cart::{
    BuyerIdentity, BuyerIdentityInput, Cart, CartCost, CartCreateInput, CartCustomer, CartLine,
    CartLineInput, DiscountCode, InvalidLine,
};
pub use id::*;
pub use money::Money;
pub use reconcile::{ErrorKind, ReconciliationResult};
pub use token::{CustomerAccessToken, TokenError};
