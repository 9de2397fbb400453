//! Mock payment provider for testing.
//!
//! Provides a configurable `PaymentProvider` for unit and integration tests.
//! Supports:
//! - Sequential order ids and captures at the ordered amount
//! - Error injection for the next N calls of a method
//! - Artificial latency (for timeout tests)
//! - Call tracking, including the idempotency key of each call
//! - Real HMAC webhook verification with a known secret

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use secrecy::SecretString;
use serde::Deserialize;

use crate::domain::payment::{
    IdempotencyKey, Money, PaymentError, PaymentEventKind, ProviderEvent, ProviderKind,
};
use crate::ports::{
    CreateOrderRequest, PaymentProvider, ProviderCapture, ProviderOrder, ProviderOrderStatus,
    ProviderRefund, ProviderRefundStatus,
};

use super::signature::{sign_payload, verify_timestamped_hmac, SignatureHeader};

/// Header the mock reads webhook signatures from.
pub const MOCK_SIGNATURE_HEADER: &str = "x-signature";

/// Secret the mock signs and verifies webhooks with.
pub const MOCK_WEBHOOK_SECRET: &str = "mock_webhook_secret";

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

/// Webhook body understood by the mock.
///
/// ```json
/// {"id": "evt_1", "type": "capture.completed", "order_id": "card_order_1", "capture_id": "cap_1"}
/// ```
#[derive(Debug, Deserialize)]
struct MockWebhookBody {
    id: String,

    #[serde(rename = "type")]
    event_type: String,

    #[serde(default)]
    order_id: Option<String>,

    #[serde(default)]
    capture_id: Option<String>,

    #[serde(default)]
    reason: Option<String>,
}

#[derive(Default)]
struct MockState {
    next_order: u64,
    orders: HashMap<String, Money>,
    order_statuses: HashMap<String, ProviderOrderStatus>,
    capture_amount: Option<Money>,
    failures: HashMap<String, (u32, PaymentError)>,
    delay: Option<Duration>,
    reject_webhooks: bool,
    call_log: Vec<MethodCall>,
}

/// Mock payment provider for testing.
pub struct MockPaymentProvider {
    kind: ProviderKind,
    webhook_secret: SecretString,
    inner: Arc<Mutex<MockState>>,
}

impl MockPaymentProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            webhook_secret: SecretString::new(MOCK_WEBHOOK_SECRET.to_string()),
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A mock that fails every webhook verification.
    pub fn rejecting_webhooks(kind: ProviderKind) -> Self {
        let mock = Self::new(kind);
        mock.state().reject_webhooks = true;
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Make the next `times` calls of `method` fail with `error`.
    pub fn fail_next(&self, method: &str, times: u32, error: PaymentError) {
        self.state()
            .failures
            .insert(method.to_string(), (times, error));
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Report this amount from `capture_order` instead of the ordered amount.
    pub fn set_capture_amount(&self, amount: Money) {
        self.state().capture_amount = Some(amount);
    }

    /// Status `get_status` reports for an order.
    pub fn set_order_status(&self, order_id: &str, status: ProviderOrderStatus) {
        self.state()
            .order_statuses
            .insert(order_id.to_string(), status);
    }

    /// Signature header value for `body`, as the provider would send it.
    pub fn sign_webhook(&self, body: &str) -> String {
        sign_payload(
            &self.webhook_secret,
            chrono::Utc::now().timestamp(),
            body.as_bytes(),
        )
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Idempotency keys passed to `method`, in call order.
    pub fn idempotency_keys(&self, method: &str) -> Vec<String> {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .filter_map(|c| c.args.last().cloned())
            .collect()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internals
    // ════════════════════════════════════════════════════════════════════════════

    /// Log the call, apply latency and return an injected failure if armed.
    async fn enter(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        let (delay, failure) = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: method.to_string(),
                args,
            });

            let failure = match state.failures.get_mut(method) {
                Some((remaining, error)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(error.clone())
                }
                _ => None,
            };
            (state.delay, failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        failure.map_or(Ok(()), Err)
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, PaymentError> {
        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::validation("body", format!("Invalid JSON: {}", e)))?;
        let body: MockWebhookBody = serde_json::from_value(payload.clone())
            .map_err(|e| PaymentError::validation("body", format!("Invalid event: {}", e)))?;

        let kind = match body.event_type.as_str() {
            "capture.completed" => PaymentEventKind::CaptureCompleted {
                capture_id: body
                    .capture_id
                    .clone()
                    .unwrap_or_else(|| format!("cap_{}", body.id)),
            },
            "capture.denied" => PaymentEventKind::CaptureDenied {
                reason: body.reason.clone().unwrap_or_else(|| "Declined".to_string()),
            },
            "capture.refunded" => PaymentEventKind::CaptureRefunded { refund_id: None },
            "order.approved" => PaymentEventKind::OrderApproved,
            _ => PaymentEventKind::Unrecognized,
        };

        let capture_id = match &kind {
            PaymentEventKind::CaptureCompleted { capture_id } => Some(capture_id.clone()),
            _ => body.capture_id,
        };

        Ok(ProviderEvent {
            provider: self.kind,
            event_id: body.id,
            event_type: body.event_type,
            kind,
            provider_order_id: body.order_id,
            capture_id,
            payload,
        })
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, PaymentError> {
        self.enter(
            "create_order",
            vec![
                request.amount.to_string(),
                request.buyer_ref.clone(),
                request.idempotency_key.to_string(),
            ],
        )
        .await?;

        let mut state = self.state();
        state.next_order += 1;
        let id = format!("{}_order_{}", self.kind, state.next_order);
        state.orders.insert(id.clone(), request.amount);

        Ok(ProviderOrder {
            approval_link: Some(format!("https://mock.example.com/approve/{}", id)),
            id,
            status: ProviderOrderStatus::Created,
            details: Vec::new(),
        })
    }

    async fn capture_order(
        &self,
        provider_order_id: &str,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderCapture, PaymentError> {
        self.enter(
            "capture_order",
            vec![provider_order_id.to_string(), idempotency_key.to_string()],
        )
        .await?;

        let state = self.state();
        let ordered = state.orders.get(provider_order_id).copied().ok_or_else(|| {
            PaymentError::provider_rejected(self.kind, format!("Unknown order {}", provider_order_id))
        })?;

        Ok(ProviderCapture {
            capture_id: format!("cap_{}", provider_order_id),
            status: ProviderOrderStatus::Completed,
            amount: state.capture_amount.unwrap_or(ordered),
        })
    }

    async fn refund(
        &self,
        capture_id: &str,
        amount: Option<Money>,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderRefund, PaymentError> {
        let amount = amount.map(|m| m.to_string()).unwrap_or_default();
        self.enter(
            "refund",
            vec![capture_id.to_string(), amount, idempotency_key.to_string()],
        )
        .await?;

        Ok(ProviderRefund {
            id: format!("ref_{}", capture_id),
            status: ProviderRefundStatus::Completed,
        })
    }

    async fn verify_webhook(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<ProviderEvent, PaymentError> {
        self.enter("verify_webhook", Vec::new()).await?;

        if self.state().reject_webhooks {
            return Err(PaymentError::invalid_signature(self.kind, "Mock rejects all webhooks"));
        }

        let raw_header = headers
            .get(MOCK_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let header = SignatureHeader::parse(raw_header)
            .map_err(|e| PaymentError::invalid_signature(self.kind, e.to_string()))?;
        verify_timestamped_hmac(
            self.kind,
            &self.webhook_secret,
            &header,
            raw_body,
            chrono::Utc::now().timestamp(),
        )?;

        self.parse_webhook(raw_body)
    }

    async fn get_status(&self, provider_order_id: &str) -> Result<ProviderOrderStatus, PaymentError> {
        self.enter("get_status", vec![provider_order_id.to_string()])
            .await?;
        Ok(self
            .state()
            .order_statuses
            .get(provider_order_id)
            .copied()
            .unwrap_or(ProviderOrderStatus::Created))
    }
}
