//! PayPal REST API and webhook payload types (Orders v2).

use serde::{Deserialize, Serialize};

use crate::ports::{ProviderOrderStatus, ProviderRefundStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalTokenResponse {
    pub access_token: String,

    /// Lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayPalAmount {
    pub currency_code: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayPalCreateOrderBody {
    pub intent: &'static str,
    pub purchase_units: Vec<PayPalPurchaseUnit>,
    pub application_context: PayPalApplicationContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayPalPurchaseUnit {
    pub amount: PayPalAmount,
    pub description: String,
    pub custom_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayPalApplicationContext {
    pub brand_name: String,
    pub landing_page: &'static str,
    pub user_action: &'static str,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalLink {
    pub href: String,
    pub rel: String,
}

/// Order resource as returned by create, get and capture.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,

    #[serde(default)]
    pub links: Vec<PayPalLink>,

    #[serde(default)]
    pub purchase_units: Vec<PayPalOrderPurchaseUnit>,
}

impl PayPalOrder {
    pub fn order_status(&self) -> ProviderOrderStatus {
        match self.status.as_str() {
            "CREATED" | "SAVED" | "PAYER_ACTION_REQUIRED" => ProviderOrderStatus::Created,
            "APPROVED" => ProviderOrderStatus::Approved,
            "COMPLETED" => ProviderOrderStatus::Completed,
            _ => ProviderOrderStatus::Failed,
        }
    }

    /// The buyer approval link (`rel == "approve"`).
    pub fn approval_link(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone())
    }

    /// First capture recorded on the order.
    pub fn first_capture(&self) -> Option<&PayPalCapture> {
        self.purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .next()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalOrderPurchaseUnit {
    #[serde(default)]
    pub payments: Option<PayPalPayments>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalPayments {
    #[serde(default)]
    pub captures: Vec<PayPalCapture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalCapture {
    pub id: String,
    pub status: String,
    pub amount: PayPalAmount,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayPalRefundBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<PayPalAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalRefund {
    pub id: String,
    pub status: String,
}

impl PayPalRefund {
    pub fn refund_status(&self) -> ProviderRefundStatus {
        match self.status.as_str() {
            "COMPLETED" => ProviderRefundStatus::Completed,
            "PENDING" => ProviderRefundStatus::Pending,
            _ => ProviderRefundStatus::Failed,
        }
    }
}

/// Request body for `/v1/notifications/verify-webhook-signature`.
#[derive(Debug, Clone, Serialize)]
pub struct PayPalVerifyRequest<'a> {
    pub auth_algo: &'a str,
    pub cert_url: &'a str,
    pub transmission_id: &'a str,
    pub transmission_sig: &'a str,
    pub transmission_time: &'a str,
    pub webhook_id: &'a str,
    pub webhook_event: &'a serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalVerifyResponse {
    pub verification_status: String,
}

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalWebhookEvent {
    pub id: String,
    pub event_type: String,

    #[serde(default)]
    pub resource: serde_json::Value,
}

/// `resource` of capture events.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalCaptureResource {
    pub id: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub status_details: Option<PayPalStatusDetails>,

    #[serde(default)]
    pub supplementary_data: Option<PayPalSupplementaryData>,

    #[serde(default)]
    pub links: Vec<PayPalLink>,
}

impl PayPalCaptureResource {
    pub fn order_id(&self) -> Option<String> {
        self.supplementary_data
            .as_ref()
            .and_then(|s| s.related_ids.as_ref())
            .and_then(|r| r.order_id.clone())
    }

    /// Capture a refund belongs to, taken from its `up` link.
    pub fn parent_capture_id(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| l.rel == "up" && l.href.contains("/captures/"))
            .and_then(|l| l.href.rsplit('/').next())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalStatusDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalSupplementaryData {
    #[serde(default)]
    pub related_ids: Option<PayPalRelatedIds>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalRelatedIds {
    #[serde(default)]
    pub order_id: Option<String>,
}
