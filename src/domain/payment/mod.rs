//! Payment domain - ledger transactions, providers, webhook events and errors.

mod errors;
mod events;
mod idempotency;
mod money;
mod provider;
mod status;
mod transaction;
mod webhook_errors;

pub use errors::{ErrorCategory, PaymentError};
pub use events::{PaymentEventKind, ProviderEvent};
pub use idempotency::IdempotencyKey;
pub use money::{Currency, Money};
pub use provider::ProviderKind;
pub use status::TransactionStatus;
pub use transaction::{ProductRef, Transaction};
pub use webhook_errors::WebhookError;

/// Reason recorded on transactions failed by the expiry sweeper.
pub const EXPIRED_REASON: &str = "Expired - No payment completed within 30 minutes";
