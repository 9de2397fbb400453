//! Payment provider adapters.
//!
//! Implements the `PaymentProvider` port for:
//! - Card processor (Stripe-compatible REST, HMAC webhooks)
//! - PayPal (Orders v2, remote webhook verification)
//! - Regional rails: Pix, SEPA, MercadoPago (stubbed orders, HMAC webhooks)
//!
//! `ResilientProvider` wraps any of them with a timeout and one retry, and
//! `ProviderRegistry` maps each `ProviderKind` to its wrapped adapter.
//!
//! # Configuration
//!
//! Credentials come from `PaymentConfig` (`PAYMENTS__PAYMENT__*`); a provider
//! without credentials is simply not registered.

mod card;
mod card_types;
mod mock;
mod paypal;
mod paypal_types;
mod regional;
mod registry;
mod resilient;
pub mod signature;

pub use card::{CardConfig, CardPaymentAdapter, CARD_SIGNATURE_HEADER};
pub use mock::{MethodCall, MockPaymentProvider, MOCK_SIGNATURE_HEADER, MOCK_WEBHOOK_SECRET};
pub use paypal::{PayPalConfig, PayPalMode, PayPalPaymentAdapter};
pub use regional::{RegionalRailAdapter, REGIONAL_SIGNATURE_HEADER};
pub use registry::ProviderRegistry;
pub use resilient::{ResilientProvider, DEFAULT_PROVIDER_TIMEOUT, MAX_ATTEMPTS};
pub use signature::{SignatureHeader, SignatureParseError};

use crate::domain::payment::{PaymentError, ProviderKind};

/// Classify a non-2xx provider response.
///
/// Server errors, throttling and request timeouts are worth one retry;
/// anything else in the 4xx range is the provider refusing the request.
pub(crate) fn status_error(
    provider: ProviderKind,
    status: reqwest::StatusCode,
    message: String,
) -> PaymentError {
    if status.is_server_error()
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
    {
        PaymentError::provider_unavailable(provider, message)
    } else {
        PaymentError::provider_rejected(provider, message)
    }
}
