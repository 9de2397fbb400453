//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `providers` - Card, PayPal and regional rail payment providers
//! - `postgres` - Transaction ledger and webhook event log (sqlx)
//! - `memory` - In-memory ledger and event log for tests and local runs
//! - `idempotency` - Idempotency record stores (Redis, in-memory)
//! - `rate_limiter` - Fixed-window rate limiters (Redis, in-memory)
//! - `auth` - Access token verification (JWT, mock)
//! - `http` - axum routes, handlers and middleware

pub mod auth;
pub mod http;
pub mod idempotency;
pub mod memory;
pub mod postgres;
pub mod providers;
pub mod rate_limiter;
