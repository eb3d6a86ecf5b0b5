//! Larder Core - Shared types library.
//!
//! This crate provides the domain types used by the Larder storefront:
//! cart snapshots, line inputs, buyer identity, customer access tokens, and
//! the [`ReconciliationResult`] returned by every cart reconciliation flow.
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be
//! used anywhere, including from test fakes.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, carts, tokens, and reconciliation outcomes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
