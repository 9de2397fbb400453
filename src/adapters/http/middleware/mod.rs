//! HTTP middleware for axum.
//!
//! This module contains middleware layers for cross-cutting concerns:
//!
//! - `auth` - Access token verification and extractors
//! - `rate_limit` - Fixed-window limits per user or client IP
//! - `idempotency` - Replays of payment commands sharing an `Idempotency-Key`

pub mod auth;
pub mod idempotency;
pub mod rate_limit;

pub use auth::{auth_middleware, AuthState, RequireAuth};
pub use idempotency::{idempotency_middleware, IdempotencyGuard, IDEMPOTENT_REPLAYED};
pub use rate_limit::{rate_limit_middleware, RateLimitPolicy, RateLimitSubject};
