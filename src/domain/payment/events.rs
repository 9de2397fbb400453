//! Verified provider webhook events.
//!
//! Each provider's raw event type is mapped into the closed `PaymentEventKind`
//! set by its adapter. The dispatcher only ever sees these kinds.

use serde::{Deserialize, Serialize};

use super::{ProviderKind, TransactionStatus};

/// What a verified provider event means for the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// Funds captured. Drives `pending -> completed`.
    CaptureCompleted { capture_id: String },

    /// Capture denied or declined. Drives `pending -> failed`.
    CaptureDenied { reason: String },

    /// Provider-side refund finished. Drives `completed -> refunded`.
    CaptureRefunded { refund_id: Option<String> },

    /// Buyer approved the order but nothing has been captured yet.
    OrderApproved,

    /// Anything the adapter does not recognize; acknowledged and logged.
    Unrecognized,
}

impl PaymentEventKind {
    /// Ledger status this event would move a transaction into, if any.
    pub fn target_status(&self) -> Option<TransactionStatus> {
        match self {
            PaymentEventKind::CaptureCompleted { .. } => Some(TransactionStatus::Completed),
            PaymentEventKind::CaptureDenied { .. } => Some(TransactionStatus::Failed),
            PaymentEventKind::CaptureRefunded { .. } => Some(TransactionStatus::Refunded),
            PaymentEventKind::OrderApproved | PaymentEventKind::Unrecognized => None,
        }
    }
}

/// A webhook event whose signature has been verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub provider: ProviderKind,

    /// Provider-assigned event id; the deduplication key for redeliveries.
    pub event_id: String,

    /// Raw provider event type, e.g. `PAYMENT.CAPTURE.COMPLETED`.
    pub event_type: String,

    pub kind: PaymentEventKind,

    /// Order the event refers to, when the provider includes it.
    pub provider_order_id: Option<String>,

    /// Capture the event refers to. Refund events often only carry this.
    pub capture_id: Option<String>,

    /// Parsed payload, kept for the audit log.
    pub payload: serde_json::Value,
}

impl ProviderEvent {
    /// Deduplication key, unique across providers.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.event_id)
    }
}
