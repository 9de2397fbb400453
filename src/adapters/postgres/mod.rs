//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresTransactionRepository` - the transaction ledger
//! - `PostgresWebhookEventRepository` - processed webhook event log

mod transaction_repository;
mod webhook_event_repository;

pub use transaction_repository::PostgresTransactionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
