//! PayPal adapter (Orders v2).
//!
//! Access tokens come from the OAuth2 client-credentials grant and are cached
//! until five minutes before they expire. Webhooks are verified by asking
//! PayPal itself: the five transmission headers, the configured webhook id and
//! the event are posted to `/v1/notifications/verify-webhook-signature`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::payment::{
    Currency, IdempotencyKey, Money, PaymentError, PaymentEventKind, ProviderEvent, ProviderKind,
};
use crate::ports::{
    CreateOrderRequest, PaymentProvider, ProviderCapture, ProviderOrder, ProviderOrderStatus,
    ProviderRefund,
};

use super::paypal_types::{
    PayPalAmount, PayPalApplicationContext, PayPalCaptureResource, PayPalCreateOrderBody,
    PayPalOrder, PayPalPurchaseUnit, PayPalRefund, PayPalRefundBody, PayPalTokenResponse,
    PayPalVerifyRequest, PayPalVerifyResponse, PayPalWebhookEvent,
};
use super::status_error;

pub const SANDBOX_BASE_URL: &str = "https://api-m.sandbox.paypal.com";
pub const LIVE_BASE_URL: &str = "https://api-m.paypal.com";

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 300;

/// Headers PayPal signs every webhook delivery with.
const TRANSMISSION_HEADERS: [&str; 5] = [
    "paypal-auth-algo",
    "paypal-cert-url",
    "paypal-transmission-id",
    "paypal-transmission-sig",
    "paypal-transmission-time",
];

/// Currencies PayPal settles that also exist in our rate table.
const SUPPORTED_CURRENCIES: [Currency; 4] =
    [Currency::Usd, Currency::Eur, Currency::Gbp, Currency::Mxn];

/// PayPal environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPalMode {
    Sandbox,
    Live,
}

impl PayPalMode {
    pub fn base_url(&self) -> &'static str {
        match self {
            PayPalMode::Sandbox => SANDBOX_BASE_URL,
            PayPalMode::Live => LIVE_BASE_URL,
        }
    }
}

/// PayPal configuration.
#[derive(Clone)]
pub struct PayPalConfig {
    client_id: String,
    client_secret: SecretString,
    webhook_id: String,
    api_base_url: String,
    brand_name: String,
    return_url: String,
    cancel_url: String,
}

impl PayPalConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        webhook_id: impl Into<String>,
        mode: PayPalMode,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            webhook_id: webhook_id.into(),
            api_base_url: mode.base_url().to_string(),
            brand_name: "Payment Orchestrator".to_string(),
            return_url: "http://localhost:3000/payment/success".to_string(),
            cancel_url: "http://localhost:3000/payment/cancel".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_brand_name(mut self, brand: impl Into<String>) -> Self {
        self.brand_name = brand.into();
        self
    }

    /// Where PayPal sends the buyer after approving or cancelling.
    pub fn with_redirect_urls(
        mut self,
        return_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        self.return_url = return_url.into();
        self.cancel_url = cancel_url.into();
        self
    }
}

struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

/// PayPal adapter.
pub struct PayPalPaymentAdapter {
    config: PayPalConfig,
    http_client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalPaymentAdapter {
    pub fn new(config: PayPalConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn network_error(e: reqwest::Error) -> PaymentError {
        PaymentError::provider_unavailable(ProviderKind::PayPal, e.to_string())
    }

    async fn failure(response: reqwest::Response, operation: &str) -> PaymentError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            provider = "paypal",
            operation,
            status = %status,
            body = %body,
            "PayPal API error"
        );
        status_error(
            ProviderKind::PayPal,
            status,
            format!("{} failed with status {}", operation, status),
        )
    }

    /// Return a cached access token or fetch a new one.
    async fn access_token(&self) -> Result<SecretString, PaymentError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http_client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "obtain access token").await);
        }

        let token: PayPalTokenResponse = response.json().await.map_err(Self::network_error)?;
        let lifetime = token.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        let value = SecretString::new(token.access_token);

        tracing::debug!(expires_in = token.expires_in, "PayPal access token refreshed");

        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(value)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        request_id: Option<&IdempotencyKey>,
        operation: &str,
    ) -> Result<reqwest::Response, PaymentError> {
        let token = self.access_token().await?;
        let mut builder = self
            .http_client
            .post(self.url(path))
            .bearer_auth(token.expose_secret())
            .json(body);
        if let Some(key) = request_id {
            builder = builder.header("PayPal-Request-Id", key.to_string());
        }

        let response = builder.send().await.map_err(Self::network_error)?;
        if !response.status().is_success() {
            return Err(Self::failure(response, operation).await);
        }
        Ok(response)
    }

    fn ensure_supported(currency: Currency) -> Result<(), PaymentError> {
        if SUPPORTED_CURRENCIES.contains(&currency) {
            Ok(())
        } else {
            Err(PaymentError::UnsupportedCurrency(currency.code().to_string()))
        }
    }

    fn money_from(amount: &PayPalAmount) -> Result<Money, PaymentError> {
        let currency: Currency = amount
            .currency_code
            .parse()
            .map_err(|_| PaymentError::UnsupportedCurrency(amount.currency_code.clone()))?;
        Ok(Money::parse_decimal(&amount.value, currency)?)
    }

    /// Map a verified webhook body into a `ProviderEvent`.
    fn map_event(raw: serde_json::Value) -> Result<ProviderEvent, PaymentError> {
        let event: PayPalWebhookEvent = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::validation("body", format!("Invalid event: {}", e)))?;

        let resource = || -> Result<PayPalCaptureResource, PaymentError> {
            serde_json::from_value(event.resource.clone()).map_err(|e| {
                PaymentError::validation("resource", format!("Invalid resource: {}", e))
            })
        };

        let mut provider_order_id = None;
        let mut capture_id = None;

        let kind = match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => {
                let capture = resource()?;
                provider_order_id = capture.order_id();
                capture_id = Some(capture.id.clone());
                PaymentEventKind::CaptureCompleted {
                    capture_id: capture.id,
                }
            }
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => {
                let capture = resource()?;
                provider_order_id = capture.order_id();
                capture_id = Some(capture.id);
                let reason = capture
                    .status_details
                    .and_then(|d| d.reason)
                    .unwrap_or_else(|| "Capture denied".to_string());
                PaymentEventKind::CaptureDenied { reason }
            }
            "PAYMENT.CAPTURE.REFUNDED" => {
                let refund = resource()?;
                provider_order_id = refund.order_id();
                capture_id = refund.parent_capture_id();
                PaymentEventKind::CaptureRefunded {
                    refund_id: Some(refund.id),
                }
            }
            "CHECKOUT.ORDER.APPROVED" => {
                provider_order_id = event
                    .resource
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                PaymentEventKind::OrderApproved
            }
            _ => PaymentEventKind::Unrecognized,
        };

        Ok(ProviderEvent {
            provider: ProviderKind::PayPal,
            event_id: event.id,
            event_type: event.event_type,
            kind,
            provider_order_id,
            capture_id,
            payload: raw,
        })
    }
}

/// Read the transmission headers, in `TRANSMISSION_HEADERS` order.
fn transmission_headers(headers: &HeaderMap) -> Result<[&str; 5], PaymentError> {
    let mut values = [""; 5];
    for (slot, name) in values.iter_mut().zip(TRANSMISSION_HEADERS) {
        *slot = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PaymentError::invalid_signature(
                    ProviderKind::PayPal,
                    format!("Missing {} header", name),
                )
            })?;
    }
    Ok(values)
}

#[async_trait]
impl PaymentProvider for PayPalPaymentAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::PayPal
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, PaymentError> {
        Self::ensure_supported(request.amount.currency())?;

        let body = PayPalCreateOrderBody {
            intent: "CAPTURE",
            purchase_units: vec![PayPalPurchaseUnit {
                amount: PayPalAmount {
                    currency_code: request.amount.currency().code().to_string(),
                    value: request.amount.to_decimal_string(),
                },
                description: request.description.clone(),
                custom_id: request.buyer_ref.clone(),
            }],
            application_context: PayPalApplicationContext {
                brand_name: self.config.brand_name.clone(),
                landing_page: "NO_PREFERENCE",
                user_action: "PAY_NOW",
                return_url: self.config.return_url.clone(),
                cancel_url: self.config.cancel_url.clone(),
            },
        };

        let response = self
            .post_json(
                "/v2/checkout/orders",
                &body,
                Some(&request.idempotency_key),
                "create order",
            )
            .await?;

        let order: PayPalOrder = response
            .json()
            .await
            .map_err(|e| PaymentError::provider_unconfirmed(ProviderKind::PayPal, e.to_string()))?;

        tracing::info!(paypal_order_id = %order.id, amount = %request.amount, "PayPal order created");

        Ok(ProviderOrder {
            status: order.order_status(),
            approval_link: order.approval_link(),
            id: order.id,
            details: Vec::new(),
        })
    }

    async fn capture_order(
        &self,
        provider_order_id: &str,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderCapture, PaymentError> {
        let response = self
            .post_json(
                &format!("/v2/checkout/orders/{}/capture", provider_order_id),
                &serde_json::json!({}),
                Some(idempotency_key),
                "capture order",
            )
            .await?;

        let order: PayPalOrder = response
            .json()
            .await
            .map_err(|e| PaymentError::provider_unconfirmed(ProviderKind::PayPal, e.to_string()))?;

        let capture = order.first_capture().ok_or_else(|| {
            PaymentError::provider_rejected(ProviderKind::PayPal, "Capture response had no capture")
        })?;

        let status = match capture.status.as_str() {
            "COMPLETED" => ProviderOrderStatus::Completed,
            "PENDING" => ProviderOrderStatus::Processing,
            _ => ProviderOrderStatus::Failed,
        };

        Ok(ProviderCapture {
            capture_id: capture.id.clone(),
            status,
            amount: Self::money_from(&capture.amount)?,
        })
    }

    async fn refund(
        &self,
        capture_id: &str,
        amount: Option<Money>,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderRefund, PaymentError> {
        let body = PayPalRefundBody {
            amount: amount.map(|m| PayPalAmount {
                currency_code: m.currency().code().to_string(),
                value: m.to_decimal_string(),
            }),
        };

        let response = self
            .post_json(
                &format!("/v2/payments/captures/{}/refund", capture_id),
                &body,
                Some(idempotency_key),
                "refund capture",
            )
            .await?;

        let refund: PayPalRefund = response
            .json()
            .await
            .map_err(|e| PaymentError::provider_unconfirmed(ProviderKind::PayPal, e.to_string()))?;

        Ok(ProviderRefund {
            status: refund.refund_status(),
            id: refund.id,
        })
    }

    async fn verify_webhook(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<ProviderEvent, PaymentError> {
        let [auth_algo, cert_url, transmission_id, transmission_sig, transmission_time] =
            transmission_headers(headers)?;

        let event: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::validation("body", format!("Invalid JSON: {}", e)))?;

        let request = PayPalVerifyRequest {
            auth_algo,
            cert_url,
            transmission_id,
            transmission_sig,
            transmission_time,
            webhook_id: &self.config.webhook_id,
            webhook_event: &event,
        };

        let response = self
            .post_json(
                "/v1/notifications/verify-webhook-signature",
                &request,
                None,
                "verify webhook signature",
            )
            .await?;

        let verification: PayPalVerifyResponse =
            response.json().await.map_err(Self::network_error)?;

        if verification.verification_status != "SUCCESS" {
            tracing::warn!(
                transmission_id,
                status = %verification.verification_status,
                "PayPal webhook verification failed"
            );
            return Err(PaymentError::invalid_signature(
                ProviderKind::PayPal,
                format!("Verification status {}", verification.verification_status),
            ));
        }

        Self::map_event(event)
    }

    async fn get_status(&self, provider_order_id: &str) -> Result<ProviderOrderStatus, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(self.url(&format!("/v2/checkout/orders/{}", provider_order_id)))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "get order").await);
        }

        let order: PayPalOrder = response.json().await.map_err(Self::network_error)?;
        Ok(order.order_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> PayPalPaymentAdapter {
        PayPalPaymentAdapter::new(
            PayPalConfig::new(
                "client-id",
                SecretString::new("client-secret".to_string()),
                "WH-ID",
                PayPalMode::Sandbox,
            )
            // Unroutable, so any accidental network call fails fast.
            .with_base_url("http://127.0.0.1:9"),
        )
    }

    fn all_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in TRANSMISSION_HEADERS {
            headers.insert(name, "value".parse().unwrap());
        }
        headers
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn mode_selects_base_url() {
        let sandbox = PayPalConfig::new("id", SecretString::new("s".into()), "wh", PayPalMode::Sandbox);
        let live = PayPalConfig::new("id", SecretString::new("s".into()), "wh", PayPalMode::Live);
        assert_eq!(sandbox.api_base_url, "https://api-m.sandbox.paypal.com");
        assert_eq!(live.api_base_url, "https://api-m.paypal.com");
    }

    #[test]
    fn unsupported_currency_is_rejected_not_relabelled() {
        assert!(PayPalPaymentAdapter::ensure_supported(Currency::Eur).is_ok());
        assert_eq!(
            PayPalPaymentAdapter::ensure_supported(Currency::Brl),
            Err(PaymentError::UnsupportedCurrency("BRL".into()))
        );
    }

    #[tokio::test]
    async fn create_order_in_unsupported_currency_makes_no_call() {
        let request = CreateOrderRequest {
            amount: Money::major(540, Currency::Brl),
            buyer_ref: "user-1".into(),
            description: "Course".into(),
            idempotency_key: IdempotencyKey::generate(),
        };
        let err = adapter().create_order(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::UnsupportedCurrency(_)));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn transmission_headers_are_read_in_order() {
        let mut headers = all_headers();
        headers.insert("paypal-auth-algo", "SHA256withRSA".parse().unwrap());
        let values = transmission_headers(&headers).unwrap();
        assert_eq!(values[0], "SHA256withRSA");
    }

    #[tokio::test]
    async fn missing_transmission_header_is_invalid_signature() {
        let mut headers = all_headers();
        headers.remove("paypal-transmission-sig");

        let err = adapter()
            .verify_webhook(&headers, br#"{"id":"WH-1","event_type":"X"}"#)
            .await
            .unwrap_err();

        match err {
            PaymentError::InvalidSignature { provider, reason } => {
                assert_eq!(provider, ProviderKind::PayPal);
                assert!(reason.contains("paypal-transmission-sig"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn capture_completed_event_maps_to_order_and_capture() {
        let event = PayPalPaymentAdapter::map_event(serde_json::json!({
            "id": "WH-1",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "CAP-1",
                "status": "COMPLETED",
                "amount": {"currency_code": "EUR", "value": "100.00"},
                "supplementary_data": {"related_ids": {"order_id": "ORDER-1"}}
            }
        }))
        .unwrap();

        assert_eq!(event.event_id, "WH-1");
        assert_eq!(event.provider_order_id.as_deref(), Some("ORDER-1"));
        assert_eq!(
            event.kind,
            PaymentEventKind::CaptureCompleted {
                capture_id: "CAP-1".into()
            }
        );
    }

    #[test]
    fn declined_capture_maps_to_denied() {
        let event = PayPalPaymentAdapter::map_event(serde_json::json!({
            "id": "WH-2",
            "event_type": "PAYMENT.CAPTURE.DECLINED",
            "resource": {
                "id": "CAP-2",
                "status_details": {"reason": "PAYER_CANNOT_PAY"},
                "supplementary_data": {"related_ids": {"order_id": "ORDER-2"}}
            }
        }))
        .unwrap();

        assert_eq!(
            event.kind,
            PaymentEventKind::CaptureDenied {
                reason: "PAYER_CANNOT_PAY".into()
            }
        );
    }

    #[test]
    fn refunded_event_points_at_parent_capture() {
        let event = PayPalPaymentAdapter::map_event(serde_json::json!({
            "id": "WH-3",
            "event_type": "PAYMENT.CAPTURE.REFUNDED",
            "resource": {
                "id": "REF-1",
                "links": [{"rel": "up", "href": "https://api-m.paypal.com/v2/payments/captures/CAP-1"}]
            }
        }))
        .unwrap();

        assert_eq!(event.capture_id.as_deref(), Some("CAP-1"));
        assert_eq!(
            event.kind,
            PaymentEventKind::CaptureRefunded {
                refund_id: Some("REF-1".into())
            }
        );
    }

    #[test]
    fn order_approved_is_acknowledged_only() {
        let event = PayPalPaymentAdapter::map_event(serde_json::json!({
            "id": "WH-4",
            "event_type": "CHECKOUT.ORDER.APPROVED",
            "resource": {"id": "ORDER-4", "status": "APPROVED"}
        }))
        .unwrap();

        assert_eq!(event.kind, PaymentEventKind::OrderApproved);
        assert_eq!(event.provider_order_id.as_deref(), Some("ORDER-4"));
    }

    #[test]
    fn subscription_events_are_unrecognized() {
        let event = PayPalPaymentAdapter::map_event(serde_json::json!({
            "id": "WH-5",
            "event_type": "BILLING.SUBSCRIPTION.ACTIVATED",
            "resource": {"id": "I-1"}
        }))
        .unwrap();

        assert_eq!(event.kind, PaymentEventKind::Unrecognized);
    }
}
