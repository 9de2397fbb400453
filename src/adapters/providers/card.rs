//! Card processor adapter.
//!
//! Talks to a Stripe-compatible REST API (form-encoded requests, JSON
//! responses). Orders are payment intents created with manual capture so the
//! capture endpoint moves the money.
//!
//! # Security
//!
//! - HMAC-SHA256 webhook signatures over the raw body, constant-time comparison
//! - 5-minute replay window on the signature timestamp
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! ```ignore
//! let config = CardConfig::new(api_key, webhook_secret);
//! let adapter = CardPaymentAdapter::new(config);
//! ```

use async_trait::async_trait;
use http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::payment::{
    Currency, IdempotencyKey, Money, PaymentError, PaymentEventKind, ProviderEvent, ProviderKind,
};
use crate::ports::{
    CreateOrderRequest, PaymentProvider, ProviderCapture, ProviderOrder, ProviderOrderStatus,
    ProviderRefund,
};

use super::card_types::{
    CardApiErrorBody, CardCharge, CardPaymentIntent, CardRefund, CardWebhookEvent,
};
use super::signature::{verify_timestamped_hmac, SignatureHeader};
use super::status_error;

/// Header carrying the webhook signature.
pub const CARD_SIGNATURE_HEADER: &str = "stripe-signature";

/// Card processor configuration.
#[derive(Clone)]
pub struct CardConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for the API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test mode events.
    require_livemode: bool,
}

impl CardConfig {
    pub fn new(api_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Card processor adapter.
pub struct CardPaymentAdapter {
    config: CardConfig,
    http_client: reqwest::Client,
}

impl CardPaymentAdapter {
    pub fn new(config: CardConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn network_error(e: reqwest::Error) -> PaymentError {
        PaymentError::provider_unavailable(ProviderKind::Card, e.to_string())
    }

    /// Turn a non-2xx response into a `PaymentError`.
    async fn failure(response: reqwest::Response, operation: &str) -> PaymentError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            provider = "card",
            operation,
            status = %status,
            body = %body,
            "Card processor API error"
        );

        let message = serde_json::from_str::<CardApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| format!("{} failed with status {}", operation, status));
        status_error(ProviderKind::Card, status, message)
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, String)],
        idempotency_key: &IdempotencyKey,
        operation: &str,
    ) -> Result<reqwest::Response, PaymentError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", idempotency_key.to_string())
            .form(params)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::failure(response, operation).await);
        }
        Ok(response)
    }

    fn money_from(amount_minor: i64, currency: &str) -> Result<Money, PaymentError> {
        let currency: Currency = currency
            .parse()
            .map_err(|_| PaymentError::UnsupportedCurrency(currency.to_uppercase()))?;
        Ok(Money::new(amount_minor, currency)?)
    }

    /// Verify at an explicit clock reading (unix seconds).
    fn verify_at(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
        now: i64,
    ) -> Result<ProviderEvent, PaymentError> {
        let raw_header = headers
            .get(CARD_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let header = SignatureHeader::parse(raw_header)
            .map_err(|e| PaymentError::invalid_signature(ProviderKind::Card, e.to_string()))?;

        verify_timestamped_hmac(
            ProviderKind::Card,
            &self.config.webhook_secret,
            &header,
            raw_body,
            now,
        )?;

        self.parse_event(raw_body)
    }

    /// Parse a verified event into the domain representation.
    fn parse_event(&self, payload: &[u8]) -> Result<ProviderEvent, PaymentError> {
        let raw: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse card webhook payload");
            PaymentError::validation("body", format!("Invalid JSON: {}", e))
        })?;
        let event: CardWebhookEvent = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::validation("body", format!("Invalid event: {}", e)))?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event in production");
            return Err(PaymentError::invalid_signature(
                ProviderKind::Card,
                "Test mode events not allowed in production",
            ));
        }

        let mut provider_order_id = None;
        let mut capture_id = None;

        let kind = match event.event_type.as_str() {
            "payment_intent.succeeded" => {
                let intent = Self::object::<CardPaymentIntent>(&event)?;
                let charge = intent.latest_charge.clone().unwrap_or_else(|| intent.id.clone());
                provider_order_id = Some(intent.id);
                capture_id = Some(charge.clone());
                PaymentEventKind::CaptureCompleted { capture_id: charge }
            }
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                let intent = Self::object::<CardPaymentIntent>(&event)?;
                let reason = intent
                    .last_payment_error
                    .and_then(|e| e.message.or(e.code))
                    .unwrap_or_else(|| format!("Card payment {}", intent.status));
                provider_order_id = Some(intent.id);
                PaymentEventKind::CaptureDenied { reason }
            }
            "payment_intent.amount_capturable_updated" => {
                let intent = Self::object::<CardPaymentIntent>(&event)?;
                provider_order_id = Some(intent.id);
                PaymentEventKind::OrderApproved
            }
            "charge.refunded" => {
                let charge = Self::object::<CardCharge>(&event)?;
                let refund_id = charge
                    .refunds
                    .and_then(|r| r.data.into_iter().next())
                    .map(|r| r.id);
                provider_order_id = charge.payment_intent;
                capture_id = Some(charge.id);
                PaymentEventKind::CaptureRefunded { refund_id }
            }
            _ => PaymentEventKind::Unrecognized,
        };

        Ok(ProviderEvent {
            provider: ProviderKind::Card,
            event_id: event.id,
            event_type: event.event_type,
            kind,
            provider_order_id,
            capture_id,
            payload: raw,
        })
    }

    fn object<T: serde::de::DeserializeOwned>(event: &CardWebhookEvent) -> Result<T, PaymentError> {
        serde_json::from_value(event.data.object.clone()).map_err(|e| {
            PaymentError::validation(
                "data.object",
                format!("Invalid {} object: {}", event.event_type, e),
            )
        })
    }
}

#[async_trait]
impl PaymentProvider for CardPaymentAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Card
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, PaymentError> {
        let params = vec![
            ("amount", request.amount.amount_minor().to_string()),
            ("currency", request.amount.currency().lowercase_code()),
            ("description", request.description.clone()),
            ("capture_method", "manual".to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[buyer_ref]", request.buyer_ref.clone()),
        ];

        let response = self
            .post_form(
                "/v1/payment_intents",
                &params,
                &request.idempotency_key,
                "create payment intent",
            )
            .await?;

        let intent: CardPaymentIntent = response
            .json()
            .await
            .map_err(|e| PaymentError::provider_unconfirmed(ProviderKind::Card, e.to_string()))?;

        let mut details = Vec::new();
        if let Some(secret) = &intent.client_secret {
            details.push(("client_secret".to_string(), secret.clone()));
        }

        tracing::info!(payment_intent = %intent.id, amount = %request.amount, "Card payment intent created");

        Ok(ProviderOrder {
            status: intent.order_status(),
            id: intent.id,
            approval_link: None,
            details,
        })
    }

    async fn capture_order(
        &self,
        provider_order_id: &str,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderCapture, PaymentError> {
        let response = self
            .post_form(
                &format!("/v1/payment_intents/{}/capture", provider_order_id),
                &[],
                idempotency_key,
                "capture payment intent",
            )
            .await?;

        let intent: CardPaymentIntent = response
            .json()
            .await
            .map_err(|e| PaymentError::provider_unconfirmed(ProviderKind::Card, e.to_string()))?;

        let received = if intent.amount_received > 0 {
            intent.amount_received
        } else {
            intent.amount
        };

        Ok(ProviderCapture {
            capture_id: intent.latest_charge.clone().unwrap_or_else(|| intent.id.clone()),
            status: intent.order_status(),
            amount: Self::money_from(received, &intent.currency)?,
        })
    }

    async fn refund(
        &self,
        capture_id: &str,
        amount: Option<Money>,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderRefund, PaymentError> {
        // Captures without a charge are recorded under the intent id.
        let target = if capture_id.starts_with("pi_") {
            "payment_intent"
        } else {
            "charge"
        };

        let mut params = vec![
            (target, capture_id.to_string()),
            ("reason", "requested_by_customer".to_string()),
        ];
        if let Some(amount) = amount {
            params.push(("amount", amount.amount_minor().to_string()));
        }

        let response = self
            .post_form("/v1/refunds", &params, idempotency_key, "create refund")
            .await?;

        let refund: CardRefund = response
            .json()
            .await
            .map_err(|e| PaymentError::provider_unconfirmed(ProviderKind::Card, e.to_string()))?;

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
        self.verify_at(headers, raw_body, chrono::Utc::now().timestamp())
    }

    async fn get_status(&self, provider_order_id: &str) -> Result<ProviderOrderStatus, PaymentError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/payment_intents/{}", provider_order_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(Self::network_error)?;

        if !response.status().is_success() {
            return Err(Self::failure(response, "get payment intent").await);
        }

        let intent: CardPaymentIntent = response
            .json()
            .await
            .map_err(|e| PaymentError::provider_unavailable(ProviderKind::Card, e.to_string()))?;
        Ok(intent.order_status())
    }
}
