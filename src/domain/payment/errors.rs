//! Payment error taxonomy.
//!
//! Every variant maps to a stable `ErrorCode` and to one of five categories
//! that decide how the error propagates:
//!
//! | Category      | Retried?                  | Logged as          |
//! |---------------|---------------------------|--------------------|
//! | Validation    | never                     | debug              |
//! | Provider      | once, same idempotency key| warn               |
//! | Security      | never                     | warn, target=security |
//! | StateMachine  | never                     | warn               |
//! | Fatal         | never, request fails closed | error            |

use thiserror::Error;

use super::{Money, ProviderKind, TransactionStatus};
use crate::domain::catalog::CatalogError;
use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Coarse classification of a `PaymentError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Provider,
    Security,
    StateMachine,
    Fatal,
}

/// Errors surfaced by payment operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaymentError {
    #[error("Idempotency-Key header is required for this operation")]
    MissingIdempotencyKey,

    #[error("Idempotency-Key must be a valid UUID, got '{0}'")]
    InvalidIdempotencyKey(String),

    #[error("Price mismatch: expected {expected}, got {claimed}")]
    PriceMismatch { expected: Money, claimed: Money },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    #[error("Payment provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: ProviderKind,
        reason: String,
        retryable: bool,
    },

    #[error("Payment provider {provider} rejected the request: {reason}")]
    ProviderRejected {
        provider: ProviderKind,
        reason: String,
    },

    #[error("Invalid webhook signature from {provider}: {reason}")]
    InvalidSignature {
        provider: ProviderKind,
        reason: String,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot transition transaction from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Product {product_id} has already been purchased")]
    AlreadyPurchased { product_id: String },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Provider order {order_id} already recorded for {provider}")]
    DuplicateProviderOrder {
        provider: ProviderKind,
        order_id: String,
    },

    #[error("A request with this Idempotency-Key is already in progress")]
    IdempotencyKeyInUse,

    #[error("Storage unavailable: {0}")]
    Storage(String),
}

impl PaymentError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Transport-level provider failure that is worth one more attempt.
    pub fn provider_unavailable(provider: ProviderKind, reason: impl Into<String>) -> Self {
        PaymentError::ProviderUnavailable {
            provider,
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Provider failure that must not be retried (e.g. timeout on a call that
    /// may have succeeded remotely, or an unsupported operation).
    pub fn provider_unconfirmed(provider: ProviderKind, reason: impl Into<String>) -> Self {
        PaymentError::ProviderUnavailable {
            provider,
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn provider_rejected(provider: ProviderKind, reason: impl Into<String>) -> Self {
        PaymentError::ProviderRejected {
            provider,
            reason: reason.into(),
        }
    }

    pub fn invalid_signature(provider: ProviderKind, reason: impl Into<String>) -> Self {
        PaymentError::InvalidSignature {
            provider,
            reason: reason.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        PaymentError::Storage(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        use PaymentError::*;
        match self {
            MissingIdempotencyKey
            | InvalidIdempotencyKey(_)
            | PriceMismatch { .. }
            | ProductNotFound(_)
            | UnsupportedCurrency(_)
            | ValidationFailed { .. }
            | UnknownProvider(_) => ErrorCategory::Validation,
            ProviderUnavailable { .. } | ProviderRejected { .. } => ErrorCategory::Provider,
            InvalidSignature { .. } | Forbidden(_) => ErrorCategory::Security,
            InvalidTransition { .. }
            | AlreadyPurchased { .. }
            | TransactionNotFound(_)
            | DuplicateProviderOrder { .. }
            | IdempotencyKeyInUse => ErrorCategory::StateMachine,
            Storage(_) => ErrorCategory::Fatal,
        }
    }

    /// Stable, documented code for API clients.
    pub fn code(&self) -> ErrorCode {
        use PaymentError::*;
        match self {
            MissingIdempotencyKey => ErrorCode::IdempotencyKeyRequired,
            InvalidIdempotencyKey(_) => ErrorCode::InvalidIdempotencyKey,
            PriceMismatch { .. } => ErrorCode::PriceMismatch,
            ProductNotFound(_) => ErrorCode::ProductNotFound,
            UnsupportedCurrency(_) => ErrorCode::UnsupportedCurrency,
            ValidationFailed { .. } => ErrorCode::ValidationFailed,
            UnknownProvider(_) => ErrorCode::UnknownProvider,
            ProviderUnavailable { .. } => ErrorCode::ProviderUnavailable,
            ProviderRejected { .. } => ErrorCode::ProviderRejected,
            InvalidSignature { .. } => ErrorCode::InvalidWebhookSignature,
            Forbidden(_) => ErrorCode::Forbidden,
            InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            AlreadyPurchased { .. } => ErrorCode::AlreadyPurchased,
            TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            DuplicateProviderOrder { .. } => ErrorCode::DuplicateProviderOrder,
            IdempotencyKeyInUse => ErrorCode::IdempotencyKeyInUse,
            Storage(_) => ErrorCode::DatabaseError,
        }
    }

    /// True only for provider transport failures eligible for the single retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::ProviderUnavailable {
                retryable: true,
                ..
            }
        )
    }
}

impl From<DomainError> for PaymentError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::TransactionNotFound => PaymentError::TransactionNotFound(err.message),
            ErrorCode::AlreadyPurchased => PaymentError::AlreadyPurchased {
                product_id: err
                    .details
                    .get("product_id")
                    .cloned()
                    .unwrap_or(err.message),
            },
            ErrorCode::ValidationFailed => PaymentError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            _ => PaymentError::Storage(err.to_string()),
        }
    }
}

impl From<ValidationError> for PaymentError {
    fn from(err: ValidationError) -> Self {
        PaymentError::ValidationFailed {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<CatalogError> for PaymentError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => PaymentError::ProductNotFound(id),
            CatalogError::PriceMismatch { expected, claimed } => {
                PaymentError::PriceMismatch { expected, claimed }
            }
            CatalogError::UnsupportedCurrency(c) => PaymentError::UnsupportedCurrency(c),
        }
    }
}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Currency;

    #[test]
    fn categories_cover_the_taxonomy() {
        assert_eq!(
            PaymentError::InvalidIdempotencyKey("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            PaymentError::provider_unavailable(ProviderKind::Card, "502").category(),
            ErrorCategory::Provider
        );
        assert_eq!(
            PaymentError::invalid_signature(ProviderKind::PayPal, "bad").category(),
            ErrorCategory::Security
        );
        assert_eq!(
            PaymentError::AlreadyPurchased {
                product_id: "course-42".into()
            }
            .category(),
            ErrorCategory::StateMachine
        );
        assert_eq!(PaymentError::storage("down").category(), ErrorCategory::Fatal);
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(PaymentError::provider_unavailable(ProviderKind::Card, "reset").is_retryable());
        assert!(!PaymentError::provider_unconfirmed(ProviderKind::Card, "timeout").is_retryable());
        assert!(!PaymentError::provider_rejected(ProviderKind::Card, "declined").is_retryable());
        assert!(!PaymentError::storage("down").is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            PaymentError::AlreadyPurchased {
                product_id: "course-42".into()
            }
            .code()
            .as_str(),
            "ALREADY_PURCHASED"
        );
        assert_eq!(
            PaymentError::PriceMismatch {
                expected: Money::major(100, Currency::Eur),
                claimed: Money::major(90, Currency::Eur),
            }
            .code()
            .as_str(),
            "PRICE_MISMATCH"
        );
    }

    #[test]
    fn price_mismatch_message_shows_both_amounts() {
        let err = PaymentError::PriceMismatch {
            expected: Money::major(100, Currency::Eur),
            claimed: Money::major(90, Currency::Eur),
        };
        assert_eq!(
            err.to_string(),
            "Price mismatch: expected 100.00 EUR, got 90.00 EUR"
        );
    }

    #[test]
    fn database_domain_errors_become_storage_errors() {
        let err: PaymentError = DomainError::database("connection refused").into();
        assert!(matches!(err, PaymentError::Storage(_)));
    }

    #[test]
    fn not_found_domain_error_keeps_its_meaning() {
        let err: PaymentError =
            DomainError::new(ErrorCode::TransactionNotFound, "tx-1").into();
        assert_eq!(err, PaymentError::TransactionNotFound("tx-1".into()));
    }

    #[test]
    fn already_purchased_domain_error_keeps_product() {
        let err: PaymentError = DomainError::new(ErrorCode::AlreadyPurchased, "dup")
            .with_detail("product_id", "course-42")
            .into();
        assert_eq!(
            err,
            PaymentError::AlreadyPurchased {
                product_id: "course-42".into()
            }
        );
    }
}
