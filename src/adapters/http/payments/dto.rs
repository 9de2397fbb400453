//! HTTP DTOs (Data Transfer Objects) for payment endpoints.
//!
//! These types define the JSON request/response structure for the payments API.
//! Amounts cross the wire as decimal strings (`"100.00"`) next to an ISO
//! currency code, never as floats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::payment::{Money, ProviderKind, Transaction};
use crate::ports::LedgerStats;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to open a payment order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentOrderRequest {
    /// Catalog product id, e.g. `course-42`.
    pub product_id: String,
    /// Display currency; the catalog currency when omitted.
    #[serde(default)]
    pub currency: Option<String>,
    /// Provider path name (`card`, `paypal`, `pix`, ...); card when omitted.
    #[serde(default)]
    pub provider: Option<String>,
    /// Amount shown to the buyer, checked against the catalog price.
    #[serde(default)]
    pub amount: Option<String>,
}

/// Request to refund a capture.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    /// Decimal amount for a partial refund; full refund when omitted.
    #[serde(default)]
    pub amount: Option<String>,
}

/// Query string of `GET /payments/methods`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentMethodsParams {
    #[serde(default)]
    pub country: Option<String>,
}

/// Query string of `GET /payments/transactions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTransactionsParams {
    #[serde(default)]
    pub limit: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for a created order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    pub transaction_id: String,
    pub provider: String,
    pub amount: String,
    pub currency: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_link: Option<String>,
}

impl OrderResponse {
    pub fn new(transaction: &Transaction, approval_link: Option<String>) -> Self {
        Self {
            order_id: transaction.provider_order_id.clone(),
            transaction_id: transaction.id.to_string(),
            provider: transaction.provider.as_str().to_string(),
            amount: transaction.amount.to_decimal_string(),
            currency: transaction.amount.currency().code().to_string(),
            status: transaction.status.as_str().to_string(),
            approval_link,
        }
    }
}

/// Response for a capture attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub transaction_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
}

impl From<&Transaction> for CaptureResponse {
    fn from(transaction: &Transaction) -> Self {
        Self {
            transaction_id: transaction.id.to_string(),
            status: transaction.status.as_str().to_string(),
            capture_id: transaction.capture_id.clone(),
        }
    }
}

/// Response for a refund.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub transaction_id: String,
    pub refund_id: String,
    /// Ledger status after the refund.
    pub status: String,
    /// Provider-side refund status (`pending`, `completed`).
    pub refund_status: String,
}

/// Acknowledgement returned to providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAckResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub duplicate: bool,
}

impl WebhookAckResponse {
    pub fn received() -> Self {
        Self {
            received: true,
            duplicate: false,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            received: true,
            duplicate: true,
        }
    }
}

/// Payment methods offered for a country.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub methods: Vec<String>,
}

impl PaymentMethodsResponse {
    pub fn new(country: Option<String>, methods: &[ProviderKind]) -> Self {
        Self {
            country: country.map(|c| c.trim().to_ascii_uppercase()),
            methods: methods.iter().map(|k| k.as_str().to_string()).collect(),
        }
    }
}

/// One ledger row as shown to its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: String,
    pub order_id: String,
    pub provider: String,
    pub amount: String,
    pub currency: String,
    pub status: String,
    pub product_id: String,
    pub product_name: String,
    pub product_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// ISO 8601.
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            order_id: tx.provider_order_id.clone(),
            provider: tx.provider.as_str().to_string(),
            amount: tx.amount.to_decimal_string(),
            currency: tx.amount.currency().code().to_string(),
            status: tx.status.as_str().to_string(),
            product_id: tx.product.product_id.to_string(),
            product_name: tx.product.name.clone(),
            product_type: tx.product.product_type.as_str().to_string(),
            capture_id: tx.capture_id.clone(),
            failure_reason: tx.failure_reason.clone(),
            created_at: tx.created_at.as_datetime().to_rfc3339(),
            paid_at: tx.paid_at.map(|t| t.as_datetime().to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionView>,
}

/// Admin ledger figures.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatsResponse {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub refunded: u64,
    /// Completed revenue per currency code, as decimal strings.
    pub revenue: BTreeMap<String, String>,
}

impl From<LedgerStats> for LedgerStatsResponse {
    fn from(stats: LedgerStats) -> Self {
        let revenue = stats
            .revenue_minor
            .iter()
            .map(|(currency, minor)| {
                let amount = Money::new(*minor, *currency)
                    .map(|m| m.to_decimal_string())
                    .unwrap_or_else(|_| minor.to_string());
                (currency.code().to_string(), amount)
            })
            .collect();
        Self {
            total: stats.total,
            pending: stats.pending,
            completed: stats.completed,
            failed: stats.failed,
            refunded: stats.refunded,
            revenue,
        }
    }
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
