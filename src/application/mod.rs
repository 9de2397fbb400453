//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers move the ledger; query handlers only read it. The
//! `Sweeper` runs the housekeeping commands on a timer.

pub mod handlers;
pub mod sweeper;

pub use handlers::payments::{
    CaptureOrderCommand, CaptureOrderHandler, CreateOrderCommand, CreateOrderHandler,
    ExpirePendingCommand, ExpirePendingHandler, HandleProviderWebhookCommand,
    HandleProviderWebhookHandler, RefundPaymentCommand, RefundPaymentHandler,
};
pub use sweeper::{PurgeResult, Sweeper, SweeperConfig};
