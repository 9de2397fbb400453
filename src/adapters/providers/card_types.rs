//! Card processor API and webhook payload types.
//!
//! Only the fields the adapter reads are modelled; everything else in the
//! processor's JSON is ignored.

use serde::Deserialize;

use crate::ports::{ProviderOrderStatus, ProviderRefundStatus};

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct CardWebhookEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub created: i64,

    pub data: CardEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardEventData {
    pub object: serde_json::Value,
}

/// Payment intent object, as returned by the API and embedded in events.
#[derive(Debug, Clone, Deserialize)]
pub struct CardPaymentIntent {
    pub id: String,
    pub status: String,

    #[serde(default)]
    pub amount: i64,

    #[serde(default)]
    pub amount_received: i64,

    pub currency: String,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Charge created by the capture; our capture id.
    #[serde(default)]
    pub latest_charge: Option<String>,

    #[serde(default)]
    pub last_payment_error: Option<CardPaymentError>,
}

impl CardPaymentIntent {
    pub fn order_status(&self) -> ProviderOrderStatus {
        match self.status.as_str() {
            "requires_payment_method" | "requires_confirmation" | "requires_action" => {
                ProviderOrderStatus::Created
            }
            "requires_capture" => ProviderOrderStatus::Approved,
            "processing" => ProviderOrderStatus::Processing,
            "succeeded" => ProviderOrderStatus::Completed,
            _ => ProviderOrderStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardPaymentError {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Charge object (refund events).
#[derive(Debug, Clone, Deserialize)]
pub struct CardCharge {
    pub id: String,

    #[serde(default)]
    pub payment_intent: Option<String>,

    #[serde(default)]
    pub refunds: Option<CardRefundList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardRefundList {
    #[serde(default)]
    pub data: Vec<CardRefund>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardRefund {
    pub id: String,
    pub status: String,
}

impl CardRefund {
    pub fn refund_status(&self) -> ProviderRefundStatus {
        match self.status.as_str() {
            "succeeded" => ProviderRefundStatus::Completed,
            "pending" | "requires_action" => ProviderRefundStatus::Pending,
            _ => ProviderRefundStatus::Failed,
        }
    }
}

/// Error envelope on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct CardApiErrorBody {
    pub error: CardApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardApiError {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}
