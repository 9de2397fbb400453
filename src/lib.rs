//! Payment Orchestrator - order, capture and refund service for digital products.
//!
//! Prices come from a server-side catalog, orders are opened with card,
//! PayPal or regional rail providers, and provider webhooks reconcile the
//! transaction ledger. Commands are idempotent per `Idempotency-Key`.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
