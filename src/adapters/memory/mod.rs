//! In-memory ledger adapters.
//!
//! Used by the test suite and by `PAYMENTS__DATABASE__URL`-less local runs.
//! Data is lost on restart.

mod transaction_repository;
mod webhook_event_repository;

pub use transaction_repository::InMemoryTransactionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
