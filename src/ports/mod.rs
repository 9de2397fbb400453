//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `PaymentProvider` - one capability contract per payment provider
//! - `TransactionRepository` - the append-only transaction ledger
//! - `IdempotencyStore` - shared cache behind the Idempotency Guard
//! - `WebhookEventRepository` - log of processed provider webhooks
//! - `RateLimiter` - fixed-window counters for the payment endpoints
//! - `AccessTokenVerifier` - checks bearer tokens issued by the auth service

mod access_token_verifier;
mod idempotency_store;
mod payment_provider;
mod rate_limiter;
mod transaction_repository;
mod webhook_event_repository;

pub use access_token_verifier::AccessTokenVerifier;
pub use idempotency_store::{IdempotencyRecord, IdempotencyStore, ReservationToken};
pub use payment_provider::{
    CreateOrderRequest, PaymentProvider, ProviderCapture, ProviderOrder, ProviderOrderStatus,
    ProviderRefund, ProviderRefundStatus,
};
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitRule, RateLimitScope,
    RateLimitStatus, RateLimiter,
};
pub use transaction_repository::{
    LedgerStats, PendingCursor, TransactionRepository, TransitionOutcome,
};
pub use webhook_event_repository::{
    SaveResult, WebhookEventOutcome, WebhookEventRecord, WebhookEventRepository,
};
