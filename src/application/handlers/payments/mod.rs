//! Payment handlers.
//!
//! ## Commands
//! - Opening provider orders at the catalog price
//! - Capturing approved orders
//! - Admin refunds
//! - Applying verified provider webhooks
//! - Expiring abandoned pending orders
//!
//! ## Queries
//! - A user's recent transactions
//! - Ledger statistics (admin)
//! - Payment methods per country

mod capture_order;
mod create_order;
mod expire_pending;
mod get_ledger_stats;
mod handle_provider_webhook;
mod ledger_transition;
mod list_payment_methods;
mod list_transactions;
mod refund_payment;

// Commands
pub use capture_order::{CaptureOrderCommand, CaptureOrderHandler, CaptureOrderResult};
pub use create_order::{CreateOrderCommand, CreateOrderHandler, CreateOrderResult};
pub use expire_pending::{
    ExpirePendingCommand, ExpirePendingHandler, ExpirePendingResult, DEFAULT_EXPIRY_BATCH_SIZE,
    DEFAULT_PENDING_TIMEOUT,
};
pub use handle_provider_webhook::{
    HandleProviderWebhookCommand, HandleProviderWebhookHandler, HandleProviderWebhookResult,
};
pub use refund_payment::{RefundPaymentCommand, RefundPaymentHandler, RefundPaymentResult};

// Queries
pub use get_ledger_stats::{GetLedgerStatsHandler, GetLedgerStatsQuery, GetLedgerStatsResult};
pub use list_payment_methods::{
    ListPaymentMethodsHandler, ListPaymentMethodsQuery, ListPaymentMethodsResult,
};
pub use list_transactions::{
    ListTransactionsHandler, ListTransactionsQuery, ListTransactionsResult,
    DEFAULT_TRANSACTION_LIMIT,
};

// Shared ledger transition path
pub use ledger_transition::{apply_change, LedgerChange, TransitionResult};
