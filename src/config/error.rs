//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Timeout out of range")]
    InvalidTimeout,

    #[error("CORS origin must be an absolute http(s) origin (https only in production): {0}")]
    InvalidCorsOrigin(String),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid card processor API key format")]
    InvalidCardKey,

    #[error("Invalid card processor webhook secret format")]
    InvalidCardWebhookSecret,

    #[error("PayPal client id, secret and webhook id must be set together")]
    IncompletePayPalConfig,

    #[error("Invalid PayPal mode (expected sandbox or live)")]
    InvalidPayPalMode,

    #[error("Live payment credentials require the production environment")]
    LiveKeysOutsideProduction,

    #[error("Invalid exchange rate overrides: {0}")]
    InvalidExchangeRates(String),

    #[error("Invalid payment timing: {0}")]
    InvalidPaymentTiming(&'static str),

    #[error("Redirect URL must be absolute http(s): {0}")]
    InvalidRedirectUrl(&'static str),

    #[error("JWT secret must be at least 32 bytes")]
    WeakJwtSecret,
}
