//! Regional rails: Pix (Brazil), SEPA transfers (EU) and MercadoPago (LatAm).
//!
//! These rails are asynchronous: the buyer pays outside our flow and the rail
//! notifies us by webhook. Order creation hands back instructions (QR link,
//! transfer reference, checkout redirect); capture and refund are not
//! supported and answer with a non-retryable `ProviderUnavailable`.
//!
//! Webhooks use the shared timestamped HMAC scheme in the `X-Signature`
//! header, one secret per rail.

use async_trait::async_trait;
use http::HeaderMap;
use secrecy::SecretString;
use serde::Deserialize;

use crate::domain::foundation::Timestamp;
use crate::domain::payment::{
    IdempotencyKey, Money, PaymentError, PaymentEventKind, ProviderEvent, ProviderKind,
};
use crate::ports::{
    CreateOrderRequest, PaymentProvider, ProviderCapture, ProviderOrder, ProviderOrderStatus,
    ProviderRefund,
};

use super::signature::{verify_timestamped_hmac, SignatureHeader};

/// Header carrying the webhook signature.
pub const REGIONAL_SIGNATURE_HEADER: &str = "x-signature";

/// Pix QR codes are valid for 30 minutes.
const PIX_EXPIRY_SECS: u64 = 30 * 60;

const MERCADOPAGO_CHECKOUT_URL: &str = "https://www.mercadopago.com.ar/checkout/v1/redirect";

/// Webhook body sent by the regional rails.
#[derive(Debug, Clone, Deserialize)]
struct RegionalWebhookEvent {
    id: String,

    #[serde(rename = "type")]
    event_type: String,

    order_id: String,

    #[serde(default)]
    payment_id: Option<String>,

    #[serde(default)]
    reason: Option<String>,
}

/// Adapter for one regional rail.
pub struct RegionalRailAdapter {
    kind: ProviderKind,
    webhook_secret: SecretString,
}

impl RegionalRailAdapter {
    /// Fails for kinds that are not regional rails.
    pub fn new(kind: ProviderKind, webhook_secret: SecretString) -> Result<Self, PaymentError> {
        if !kind.is_regional() {
            return Err(PaymentError::validation(
                "provider",
                format!("{} is not a regional rail", kind),
            ));
        }
        Ok(Self {
            kind,
            webhook_secret,
        })
    }

    fn id_prefix(&self) -> &'static str {
        match self.kind {
            ProviderKind::Pix => "pix",
            ProviderKind::Sepa => "sepa",
            _ => "mp",
        }
    }

    /// Build the order for a request at `now`.
    fn open_order(&self, request: &CreateOrderRequest, now: Timestamp) -> ProviderOrder {
        let millis = now.as_unix_millis();
        let id = format!("{}_{}", self.id_prefix(), millis);

        let (approval_link, details) = match self.kind {
            ProviderKind::Pix => (
                Some(format!("https://pix.example.com/qr/{}", id)),
                vec![(
                    "expires_at".to_string(),
                    now.plus_secs(PIX_EXPIRY_SECS).as_datetime().to_rfc3339(),
                )],
            ),
            ProviderKind::Sepa => (
                None,
                vec![
                    ("reference".to_string(), format!("REF{}", millis)),
                    ("amount".to_string(), request.amount.to_string()),
                    ("processing_time".to_string(), "1-3 business days".to_string()),
                ],
            ),
            _ => (Some(MERCADOPAGO_CHECKOUT_URL.to_string()), Vec::new()),
        };

        ProviderOrder {
            id,
            status: ProviderOrderStatus::Created,
            approval_link,
            details,
        }
    }

    fn verify_at(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
        now: i64,
    ) -> Result<ProviderEvent, PaymentError> {
        let raw_header = headers
            .get(REGIONAL_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let header = SignatureHeader::parse(raw_header)
            .map_err(|e| PaymentError::invalid_signature(self.kind, e.to_string()))?;

        verify_timestamped_hmac(self.kind, &self.webhook_secret, &header, raw_body, now)?;

        let raw: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::validation("body", format!("Invalid JSON: {}", e)))?;
        let event: RegionalWebhookEvent = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::validation("body", format!("Invalid event: {}", e)))?;

        let payment_id = event
            .payment_id
            .clone()
            .unwrap_or_else(|| event.order_id.clone());

        let kind = match event.event_type.as_str() {
            "payment.completed" => PaymentEventKind::CaptureCompleted {
                capture_id: payment_id.clone(),
            },
            "payment.failed" | "payment.expired" => PaymentEventKind::CaptureDenied {
                reason: event
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("{} {}", self.kind, event.event_type)),
            },
            "payment.refunded" => PaymentEventKind::CaptureRefunded { refund_id: None },
            _ => PaymentEventKind::Unrecognized,
        };

        Ok(ProviderEvent {
            provider: self.kind,
            event_id: event.id,
            event_type: event.event_type,
            kind,
            provider_order_id: Some(event.order_id),
            capture_id: Some(payment_id),
            payload: raw,
        })
    }

    fn unsupported(&self, operation: &str) -> PaymentError {
        PaymentError::provider_unconfirmed(
            self.kind,
            format!("{} is not supported for {}", operation, self.kind),
        )
    }
}

#[async_trait]
impl PaymentProvider for RegionalRailAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, PaymentError> {
        let order = self.open_order(request, Timestamp::now());
        tracing::info!(provider = %self.kind, order_id = %order.id, amount = %request.amount, "Regional order created");
        Ok(order)
    }

    async fn capture_order(
        &self,
        _provider_order_id: &str,
        _idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderCapture, PaymentError> {
        Err(self.unsupported("Capture"))
    }

    async fn refund(
        &self,
        _capture_id: &str,
        _amount: Option<Money>,
        _idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderRefund, PaymentError> {
        Err(self.unsupported("Refund"))
    }

    async fn verify_webhook(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<ProviderEvent, PaymentError> {
        self.verify_at(headers, raw_body, chrono::Utc::now().timestamp())
    }

    async fn get_status(&self, _provider_order_id: &str) -> Result<ProviderOrderStatus, PaymentError> {
        // Settlement is only ever learned from the rail's webhook.
        Ok(ProviderOrderStatus::Processing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::signature::sign_payload;
    use crate::domain::payment::Currency;

    const SECRET: &str = "regional-secret";
    const NOW: i64 = 1_704_067_200;

    fn rail(kind: ProviderKind) -> RegionalRailAdapter {
        RegionalRailAdapter::new(kind, SecretString::new(SECRET.to_string())).unwrap()
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            amount: Money::major(100, Currency::Eur),
            buyer_ref: "user-1".into(),
            description: "Course".into(),
            idempotency_key: IdempotencyKey::generate(),
        }
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn signed(payload: &str) -> HeaderMap {
        let value = sign_payload(&SecretString::new(SECRET.to_string()), NOW, payload.as_bytes());
        let mut headers = HeaderMap::new();
        headers.insert(REGIONAL_SIGNATURE_HEADER, value.parse().unwrap());
        headers
    }

    #[test]
    fn non_regional_kind_is_rejected() {
        let result = RegionalRailAdapter::new(ProviderKind::Card, SecretString::new("s".into()));
        assert!(result.is_err());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Order Creation Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn pix_order_has_link_and_thirty_minute_expiry() {
        let order = rail(ProviderKind::Pix).open_order(&request(), at(NOW));

        assert_eq!(order.id, format!("pix_{}", NOW * 1000));
        assert_eq!(order.status, ProviderOrderStatus::Created);
        assert!(order.approval_link.is_some());
        let expires = &order.details[0];
        assert_eq!(expires.0, "expires_at");
        assert_eq!(expires.1, at(NOW + 1800).as_datetime().to_rfc3339());
    }

    #[test]
    fn sepa_order_carries_transfer_reference() {
        let order = rail(ProviderKind::Sepa).open_order(&request(), at(NOW));

        assert_eq!(order.id, format!("sepa_{}", NOW * 1000));
        assert!(order.approval_link.is_none());
        assert!(order
            .details
            .contains(&("reference".to_string(), format!("REF{}", NOW * 1000))));
    }

    #[test]
    fn mercadopago_order_redirects_to_checkout() {
        let order = rail(ProviderKind::MercadoPago).open_order(&request(), at(NOW));

        assert!(order.id.starts_with("mp_"));
        assert_eq!(order.approval_link.as_deref(), Some(MERCADOPAGO_CHECKOUT_URL));
    }

    #[tokio::test]
    async fn capture_and_refund_are_not_retryable() {
        let pix = rail(ProviderKind::Pix);
        let key = IdempotencyKey::generate();

        let capture = pix.capture_order("pix_1", &key).await.unwrap_err();
        let refund = pix.refund("pix_1", None, &key).await.unwrap_err();

        assert!(matches!(capture, PaymentError::ProviderUnavailable { .. }));
        assert!(!capture.is_retryable());
        assert!(!refund.is_retryable());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn completed_webhook_maps_to_capture_completed() {
        let payload = r#"{"id":"evt_pix_1","type":"payment.completed","order_id":"pix_1","payment_id":"E123"}"#;
        let event = rail(ProviderKind::Pix)
            .verify_at(&signed(payload), payload.as_bytes(), NOW)
            .unwrap();

        assert_eq!(event.provider, ProviderKind::Pix);
        assert_eq!(event.provider_order_id.as_deref(), Some("pix_1"));
        assert_eq!(
            event.kind,
            PaymentEventKind::CaptureCompleted {
                capture_id: "E123".into()
            }
        );
    }

    #[test]
    fn expired_webhook_maps_to_denied() {
        let payload = r#"{"id":"evt_2","type":"payment.expired","order_id":"sepa_1"}"#;
        let event = rail(ProviderKind::Sepa)
            .verify_at(&signed(payload), payload.as_bytes(), NOW)
            .unwrap();
        assert!(matches!(event.kind, PaymentEventKind::CaptureDenied { .. }));
    }

    #[test]
    fn tampered_webhook_is_rejected() {
        let payload = r#"{"id":"evt_3","type":"payment.completed","order_id":"mp_1"}"#;
        let headers = signed(payload);
        let tampered = payload.replace("mp_1", "mp_2");

        let err = rail(ProviderKind::MercadoPago)
            .verify_at(&headers, tampered.as_bytes(), NOW)
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature { .. }));
    }
}
