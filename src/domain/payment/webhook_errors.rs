//! Webhook error types.
//!
//! Status codes drive the provider's redelivery behavior: 2xx stops it,
//! 4xx stops it for most providers, 5xx makes them retry later.

use axum::http::StatusCode;
use thiserror::Error;

use super::{PaymentError, ProviderKind};
use crate::domain::foundation::ErrorCode;

/// Errors that stop a webhook from being applied to the ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WebhookError {
    /// Path segment did not name a known provider.
    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    /// Body is not declared as JSON.
    #[error("Invalid Content-Type. Expected application/json")]
    InvalidContentType,

    /// Signature missing, malformed, stale, or wrong.
    #[error("Invalid signature from {provider}: {reason}")]
    InvalidSignature {
        provider: ProviderKind,
        reason: String,
    },

    /// Verified payload that we cannot interpret.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Provider-side verification endpoint unreachable.
    #[error("Verification unavailable: {0}")]
    VerificationUnavailable(String),

    /// Ledger or event log storage failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WebhookError {
    /// Returns true if the provider should redeliver this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Storage(_) | WebhookError::VerificationUnavailable(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            WebhookError::InvalidContentType | WebhookError::ParseError(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::InvalidSignature { .. } => StatusCode::UNAUTHORIZED,
            WebhookError::VerificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WebhookError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            WebhookError::UnknownProvider(_) => ErrorCode::UnknownProvider,
            WebhookError::InvalidContentType => ErrorCode::InvalidContentType,
            WebhookError::InvalidSignature { .. } => ErrorCode::InvalidWebhookSignature,
            WebhookError::ParseError(_) => ErrorCode::ValidationFailed,
            WebhookError::VerificationUnavailable(_) => ErrorCode::ProviderUnavailable,
            WebhookError::Storage(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature { provider, reason } => {
                WebhookError::InvalidSignature { provider, reason }
            }
            PaymentError::UnknownProvider(p) => WebhookError::UnknownProvider(p),
            PaymentError::ProviderUnavailable { reason, .. } => {
                WebhookError::VerificationUnavailable(reason)
            }
            PaymentError::ValidationFailed { message, .. } => WebhookError::ParseError(message),
            other => WebhookError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failures_are_unauthorized_and_final() {
        let err = WebhookError::InvalidSignature {
            provider: ProviderKind::Card,
            reason: "mismatch".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(!err.is_retryable());
        assert_eq!(err.code().as_str(), "INVALID_WEBHOOK_SIGNATURE");
    }

    #[test]
    fn content_type_error_message_is_stable() {
        assert_eq!(
            WebhookError::InvalidContentType.to_string(),
            "Invalid Content-Type. Expected application/json"
        );
        assert_eq!(
            WebhookError::InvalidContentType.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_errors_ask_for_redelivery() {
        let err = WebhookError::Storage("db down".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_retryable());
    }

    #[test]
    fn payment_errors_map_onto_webhook_errors() {
        let sig: WebhookError =
            PaymentError::invalid_signature(ProviderKind::PayPal, "status FAILURE").into();
        assert!(matches!(sig, WebhookError::InvalidSignature { .. }));

        let unavailable: WebhookError =
            PaymentError::provider_unavailable(ProviderKind::PayPal, "timeout").into();
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let storage: WebhookError = PaymentError::storage("pool closed").into();
        assert!(storage.is_retryable());
    }
}
