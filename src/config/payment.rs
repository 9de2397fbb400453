//! Payment configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;
use crate::adapters::providers::{PayPalMode, MAX_ATTEMPTS};
use crate::domain::catalog::ExchangeRates;

/// Headroom between the last provider attempt and the reservation lapsing.
pub const LOCK_MARGIN_SECS: u64 = 5;

/// Payment configuration (providers, ledger timing, redirects)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Card processor secret key (`sk_test_...` / `sk_live_...`)
    pub card_api_key: Option<SecretString>,

    /// Card processor webhook signing secret (`whsec_...`)
    pub card_webhook_secret: Option<SecretString>,

    /// PayPal REST client id; PayPal is disabled when unset
    pub paypal_client_id: Option<String>,

    pub paypal_client_secret: Option<SecretString>,

    /// Webhook id PayPal verifies deliveries against
    pub paypal_webhook_id: Option<String>,

    /// `sandbox` or `live`
    #[serde(default = "default_paypal_mode")]
    pub paypal_mode: String,

    /// Shared HMAC secret for Pix, SEPA and MercadoPago callbacks;
    /// regional rails are disabled when unset
    pub regional_webhook_secret: Option<SecretString>,

    /// Reject a second completed purchase of the same product
    #[serde(default = "default_true")]
    pub enforce_single_purchase: bool,

    /// Accepted gap between a claimed amount and the catalog price
    #[serde(default = "default_price_tolerance_bps")]
    pub price_tolerance_bps: i64,

    /// Exchange rate overrides, e.g. `USD=1.10,GBP=0.85`
    pub exchange_rates: Option<String>,

    /// Per-call timeout for provider requests, in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// How long a completed idempotent response is replayed, in seconds
    #[serde(default = "default_idempotency_ttl")]
    pub idempotency_ttl_secs: u64,

    /// How long an in-flight idempotency reservation lives, in seconds.
    /// Must outlast two provider attempts plus [`LOCK_MARGIN_SECS`].
    #[serde(default = "default_idempotency_lock_ttl")]
    pub idempotency_lock_ttl_secs: u64,

    /// Pending transactions older than this are expired, in minutes
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout_mins: u64,

    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,

    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    /// Processed webhook events older than this are purged
    #[serde(default = "default_webhook_retention")]
    pub webhook_retention_days: i64,

    /// Where providers send the buyer after approval
    #[serde(default = "default_return_url")]
    pub return_url: String,

    /// Where providers send the buyer after cancelling
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

impl PaymentConfig {
    /// Check if using card processor test mode
    pub fn is_test_mode(&self) -> bool {
        self.card_api_key
            .as_ref()
            .is_some_and(|k| k.expose_secret().starts_with("sk_test_"))
    }

    /// Check if using card processor live mode
    pub fn is_live_mode(&self) -> bool {
        self.card_api_key
            .as_ref()
            .is_some_and(|k| k.expose_secret().starts_with("sk_live_"))
    }

    /// True when all PayPal credentials are present.
    pub fn paypal_enabled(&self) -> bool {
        self.paypal_client_id.is_some()
            && self.paypal_client_secret.is_some()
            && self.paypal_webhook_id.is_some()
    }

    pub fn paypal_mode(&self) -> Result<PayPalMode, ValidationError> {
        match self.paypal_mode.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(PayPalMode::Sandbox),
            "live" => Ok(PayPalMode::Live),
            _ => Err(ValidationError::InvalidPayPalMode),
        }
    }

    /// Standard rate table with configured overrides applied.
    pub fn exchange_rates(&self) -> Result<ExchangeRates, ValidationError> {
        let rates = ExchangeRates::standard();
        match &self.exchange_rates {
            Some(spec) => rates
                .with_overrides(spec)
                .map_err(|e| ValidationError::InvalidExchangeRates(e.to_string())),
            None => Ok(rates),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    /// Shortest lock that outlives one provider call with its retry.
    pub fn min_lock_ttl_secs(&self) -> u64 {
        u64::from(MAX_ATTEMPTS) * self.provider_timeout_secs + LOCK_MARGIN_SECS
    }

    pub fn idempotency_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_lock_ttl_secs)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_mins * 60)
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Validate payment configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let api_key = self
            .card_api_key
            .as_ref()
            .ok_or(ValidationError::MissingRequired("PAYMENT__CARD_API_KEY"))?;
        let webhook_secret = self
            .card_webhook_secret
            .as_ref()
            .ok_or(ValidationError::MissingRequired("PAYMENT__CARD_WEBHOOK_SECRET"))?;

        // Key prefixes identify the credential type
        if !api_key.expose_secret().starts_with("sk_") {
            return Err(ValidationError::InvalidCardKey);
        }
        if !webhook_secret.expose_secret().starts_with("whsec_") {
            return Err(ValidationError::InvalidCardWebhookSecret);
        }

        let paypal_fields = [
            self.paypal_client_id.is_some(),
            self.paypal_client_secret.is_some(),
            self.paypal_webhook_id.is_some(),
        ];
        if paypal_fields.iter().any(|set| *set) && !self.paypal_enabled() {
            return Err(ValidationError::IncompletePayPalConfig);
        }
        let paypal_mode = self.paypal_mode()?;

        if *environment != Environment::Production
            && (self.is_live_mode() || (self.paypal_enabled() && paypal_mode == PayPalMode::Live))
        {
            return Err(ValidationError::LiveKeysOutsideProduction);
        }

        self.exchange_rates()?;

        if self.provider_timeout_secs == 0 || self.provider_timeout_secs > 60 {
            return Err(ValidationError::InvalidPaymentTiming("provider_timeout_secs"));
        }
        if self.idempotency_ttl_secs == 0 {
            return Err(ValidationError::InvalidPaymentTiming("idempotency_ttl_secs"));
        }
        if self.idempotency_lock_ttl_secs < self.min_lock_ttl_secs() {
            return Err(ValidationError::InvalidPaymentTiming(
                "idempotency_lock_ttl_secs must cover two provider attempts plus margin",
            ));
        }
        if self.pending_timeout_mins == 0 {
            return Err(ValidationError::InvalidPaymentTiming("pending_timeout_mins"));
        }
        if self.expiry_interval_secs == 0 || self.purge_interval_secs == 0 {
            return Err(ValidationError::InvalidPaymentTiming("sweep interval"));
        }
        if self.webhook_retention_days < 1 {
            return Err(ValidationError::InvalidPaymentTiming("webhook_retention_days"));
        }

        for (name, url) in [("return_url", &self.return_url), ("cancel_url", &self.cancel_url)] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ValidationError::InvalidRedirectUrl(name));
            }
        }

        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            card_api_key: None,
            card_webhook_secret: None,
            paypal_client_id: None,
            paypal_client_secret: None,
            paypal_webhook_id: None,
            paypal_mode: default_paypal_mode(),
            regional_webhook_secret: None,
            enforce_single_purchase: default_true(),
            price_tolerance_bps: default_price_tolerance_bps(),
            exchange_rates: None,
            provider_timeout_secs: default_provider_timeout(),
            idempotency_ttl_secs: default_idempotency_ttl(),
            idempotency_lock_ttl_secs: default_idempotency_lock_ttl(),
            pending_timeout_mins: default_pending_timeout(),
            expiry_interval_secs: default_expiry_interval(),
            purge_interval_secs: default_purge_interval(),
            webhook_retention_days: default_webhook_retention(),
            return_url: default_return_url(),
            cancel_url: default_cancel_url(),
        }
    }
}

fn default_paypal_mode() -> String {
    "sandbox".to_string()
}

fn default_true() -> bool {
    true
}

fn default_price_tolerance_bps() -> i64 {
    100
}

fn default_provider_timeout() -> u64 {
    10
}

fn default_idempotency_ttl() -> u64 {
    24 * 60 * 60
}

fn default_idempotency_lock_ttl() -> u64 {
    60
}

fn default_pending_timeout() -> u64 {
    30
}

fn default_expiry_interval() -> u64 {
    300
}

fn default_purge_interval() -> u64 {
    3600
}

fn default_webhook_retention() -> i64 {
    30
}

fn default_return_url() -> String {
    "http://localhost:3000/payment/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:3000/payment/cancel".to_string()
}
