//! Timeout and single-retry decorator for payment providers.
//!
//! Every call runs under `tokio::time::timeout`. A transport failure or a
//! timeout gets exactly one more attempt with the same arguments, so the
//! provider sees the same idempotency key twice and can collapse them. A
//! second failure is surfaced as a non-retryable `ProviderUnavailable` so no
//! outer layer retries again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;

use crate::domain::payment::{IdempotencyKey, Money, PaymentError, ProviderEvent, ProviderKind};
use crate::ports::{
    CreateOrderRequest, PaymentProvider, ProviderCapture, ProviderOrder, ProviderOrderStatus,
    ProviderRefund,
};

/// Default bound on a single provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts per provider call, the first included.
pub const MAX_ATTEMPTS: u32 = 2;

enum AttemptFailure {
    TimedOut,
    Failed(PaymentError),
}

/// Wraps a provider with a timeout and one retry.
pub struct ResilientProvider {
    inner: Arc<dyn PaymentProvider>,
    timeout: Duration,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn PaymentProvider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn with_default_timeout(inner: Arc<dyn PaymentProvider>) -> Self {
        Self::new(inner, DEFAULT_PROVIDER_TIMEOUT)
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T, PaymentError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, PaymentError>> + Send,
        T: Send,
    {
        let provider = self.inner.kind();
        let mut last = AttemptFailure::TimedOut;

        for n in 1..=MAX_ATTEMPTS {
            match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_retryable() => {
                    tracing::warn!(
                        provider = %provider,
                        operation,
                        attempt = n,
                        error = %e,
                        "Provider call failed"
                    );
                    last = AttemptFailure::Failed(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!(
                        provider = %provider,
                        operation,
                        attempt = n,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Provider call timed out"
                    );
                    last = AttemptFailure::TimedOut;
                }
            }
        }

        Err(match last {
            AttemptFailure::TimedOut => PaymentError::provider_unconfirmed(
                provider,
                format!(
                    "Failed to confirm {} within {}s",
                    operation,
                    self.timeout.as_secs()
                ),
            ),
            AttemptFailure::Failed(e) => {
                let reason = match e {
                    PaymentError::ProviderUnavailable { reason, .. } => reason,
                    other => other.to_string(),
                };
                PaymentError::provider_unconfirmed(provider, reason)
            }
        })
    }
}

#[async_trait]
impl PaymentProvider for ResilientProvider {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, PaymentError> {
        self.call("create_order", || self.inner.create_order(request))
            .await
    }

    async fn capture_order(
        &self,
        provider_order_id: &str,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderCapture, PaymentError> {
        self.call("capture_order", || {
            self.inner.capture_order(provider_order_id, idempotency_key)
        })
        .await
    }

    async fn refund(
        &self,
        capture_id: &str,
        amount: Option<Money>,
        idempotency_key: &IdempotencyKey,
    ) -> Result<ProviderRefund, PaymentError> {
        self.call("refund", || self.inner.refund(capture_id, amount, idempotency_key))
            .await
    }

    async fn verify_webhook(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<ProviderEvent, PaymentError> {
        self.call("verify_webhook", || self.inner.verify_webhook(headers, raw_body))
            .await
    }

    async fn get_status(&self, provider_order_id: &str) -> Result<ProviderOrderStatus, PaymentError> {
        self.call("get_status", || self.inner.get_status(provider_order_id))
            .await
    }
}
