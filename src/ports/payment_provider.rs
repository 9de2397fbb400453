//! Payment provider port.
//!
//! One capability contract implemented by every provider (card processor,
//! PayPal, regional rails). Callers hold an `Arc<dyn PaymentProvider>` and
//! never branch on the provider kind.
//!
//! # Idempotency
//!
//! Every mutating call carries the `IdempotencyKey` obtained for the client
//! request. Adapters forward it to the provider (`Idempotency-Key`,
//! `PayPal-Request-Id`) so a retried call can never open a second order.

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::domain::payment::{IdempotencyKey, Money, PaymentError, ProviderEvent, ProviderKind};

/// Request to open an order with a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderRequest {
    pub amount: Money,

    /// Our reference for the buyer (user id); echoed back in provider metadata.
    pub buyer_ref: String,

    pub description: String,

    pub idempotency_key: IdempotencyKey,
}

/// Provider-side order status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOrderStatus {
    /// Created, waiting for the buyer.
    Created,
    /// Buyer approved; capture outstanding.
    Approved,
    /// Payment in flight (bank transfer, async rails).
    Processing,
    /// Funds captured.
    Completed,
    /// Declined, voided or expired at the provider.
    Failed,
}

/// Result of `create_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub status: ProviderOrderStatus,

    /// Where to send the buyer to approve the payment, when the flow needs it.
    pub approval_link: Option<String>,

    /// Extra provider-specific data worth keeping on the transaction
    /// (bank transfer reference, client secret, expiry).
    pub details: Vec<(String, String)>,
}

/// Result of `capture_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapture {
    pub capture_id: String,
    pub status: ProviderOrderStatus,
    pub amount: Money,
}

/// Provider-side refund status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRefundStatus {
    Pending,
    Completed,
    Failed,
}

impl ProviderRefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderRefundStatus::Pending => "pending",
            ProviderRefundStatus::Completed => "completed",
            ProviderRefundStatus::Failed => "failed",
        }
    }
}

/// Result of `refund`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRefund {
    pub id: String,
    pub status: ProviderRefundStatus,
}

/// Port for payment provider integrations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Which provider this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Open an order for `amount`. Does not move money.
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, PaymentError>;

    /// Capture a previously approved order.
    async fn capture_order(
        &self,
        provider_order_id: &str,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderCapture, PaymentError>;

    /// Refund a capture, fully when `amount` is `None`.
    async fn refund(
        &self,
        capture_id: &str,
        amount: Option<Money>,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderRefund, PaymentError>;

    /// Verify a webhook against the raw request bytes and parse it.
    ///
    /// Must be computed over `raw_body` exactly as received. Returns
    /// `PaymentError::InvalidSignature` for anything that does not verify.
    async fn verify_webhook(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<ProviderEvent, PaymentError>;

    /// Poll the provider for the current order status (reconciliation).
    async fn get_status(&self, provider_order_id: &str) -> Result<ProviderOrderStatus, PaymentError>;
}
