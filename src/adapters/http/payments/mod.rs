//! HTTP adapter for payment endpoints.
//!
//! Exposes the payment ledger via REST API:
//! - `POST /payments/order` - Open an order with a provider
//! - `POST /payments/order/:order_id/capture` - Capture an approved order
//! - `POST /payments/refund/:capture_id` - Refund a capture (admin)
//! - `POST /payments/webhook/:provider` - Provider event callback
//! - `GET /payments/methods` - Payment methods for a country
//! - `GET /payments/transactions` - Caller's recent transactions
//! - `GET /payments/admin/stats` - Ledger statistics (admin)

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{
    PaymentApiError, PaymentPolicy, PaymentsAppState, WebhookApiError, IDEMPOTENCY_KEY_HEADER,
};
pub use routes::payments_router;
