//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `catalog` - Trusted product prices, currency conversion, price tolerance
//! - `payment` - Ledger transactions, providers, webhook events, payment errors

pub mod catalog;
pub mod foundation;
pub mod payment;
