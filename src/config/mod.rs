//! Typed service configuration.
//!
//! Everything comes from `PAYMENTS__`-prefixed environment variables (plus an
//! optional `.env` in development), with `__` separating sections:
//!
//! | Variable                               | Field                        |
//! |----------------------------------------|------------------------------|
//! | `PAYMENTS__DATABASE__URL`              | `database.url`               |
//! | `PAYMENTS__REDIS__URL`                 | `redis.url`                  |
//! | `PAYMENTS__PAYMENT__CARD_API_KEY`      | `payment.card_api_key`       |
//! | `PAYMENTS__AUTH__JWT_SECRET`           | `auth.jwt_secret`            |
//! | `PAYMENTS__SERVER__ENVIRONMENT`        | `server.environment`         |
//!
//! Loading only checks shape. Call [`AppConfig::validate`] before serving.

mod auth;
mod database;
mod error;
mod payment;
mod redis;
mod server;

pub use auth::AuthConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Transaction ledger
    pub database: DatabaseConfig,

    /// Idempotency records and rate limit windows
    pub redis: RedisConfig,

    /// Provider credentials, pricing and ledger timing
    #[serde(default)]
    pub payment: PaymentConfig,

    pub auth: AuthConfig,
}

impl AppConfig {
    /// Read `.env` if present, then the process environment.
    ///
    /// # Errors
    ///
    /// Fails when a required section (`database`, `redis`, `auth`) is absent
    /// or a value does not parse into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let source = config::Environment::default()
            .prefix("PAYMENTS")
            .separator("__");

        Ok(config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?)
    }

    /// Semantic checks across every section. Payment checks depend on the
    /// deployment stage, so live credentials outside production fail here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.payment.validate(&self.server.environment)?;
        // A request cut off by the server timeout must not outlive its reservation.
        if self.server.request_timeout_secs >= self.payment.idempotency_lock_ttl_secs {
            return Err(ValidationError::InvalidPaymentTiming(
                "server.request_timeout_secs must be below idempotency_lock_ttl_secs",
            ));
        }
        self.auth.validate()
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
