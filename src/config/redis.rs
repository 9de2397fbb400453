//! Redis connection settings
//!
//! Redis holds two kinds of short-lived state: idempotency records (24h) and
//! rate limit windows (minutes). Losing it degrades replay protection but
//! never the ledger, so the connection is opened once at startup and shared.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{ErrorKind, RedisError};
use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// `redis://` or `rediss://` URL
    pub url: String,

    /// Seconds allowed for the initial connection
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn uses_tls(&self) -> bool {
        self.url.starts_with("rediss://")
    }

    /// Open the shared multiplexed connection, failing after [`Self::timeout`].
    pub async fn connect(&self) -> Result<MultiplexedConnection, RedisError> {
        let client = redis::Client::open(self.url.as_str())?;
        tokio::time::timeout(self.timeout(), client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| RedisError::from((ErrorKind::IoError, "redis connect timed out")))?
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("REDIS__URL"));
        }
        if !matches!(self.url.split_once("://"), Some(("redis" | "rediss", _))) {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    3
}
