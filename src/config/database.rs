//! PostgreSQL ledger connection settings

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use super::error::ValidationError;

/// Where the payment ledger lives and how the pool talks to it.
///
/// Every connection is opened with a server-side `statement_timeout` and
/// `lock_timeout` so a stuck row lock on a transaction cannot pin a request
/// past its own deadline.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` connection string
    pub url: String,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds a handler waits for a free connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Server-side cap on a single statement, in milliseconds
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,

    /// Server-side cap on waiting for a row lock, in milliseconds
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Apply `migrations/` before serving
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Parsed connection options with the ledger session settings applied.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        let options = PgConnectOptions::from_str(&self.url)?
            .application_name("payment-orchestrator")
            .options([
                ("statement_timeout", self.statement_timeout_ms.to_string()),
                ("lock_timeout", self.lock_timeout_ms.to_string()),
            ]);
        Ok(options)
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout())
            .idle_timeout(self.idle_timeout())
            .max_lifetime(self.max_lifetime())
    }

    /// Open the ledger pool.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        self.pool_options().connect_with(self.connect_options()?).await
    }

    /// The URL with any password masked, for startup logs.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        match rest.split_once('@') {
            Some((userinfo, host)) => {
                let user = userinfo.split(':').next().unwrap_or_default();
                format!("{scheme}://{user}:***@{host}")
            }
            None => self.url.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE__URL"));
        }
        if !matches!(self.url.split_once("://"), Some(("postgres" | "postgresql", _))) {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > 100 {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        if self.statement_timeout_ms == 0 || self.lock_timeout_ms > self.statement_timeout_ms {
            return Err(ValidationError::InvalidPaymentTiming(
                "lock_timeout_ms must not exceed a non-zero statement_timeout_ms",
            ));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            statement_timeout_ms: default_statement_timeout(),
            lock_timeout_ms: default_lock_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_statement_timeout() -> u64 {
    5_000
}

fn default_lock_timeout() -> u64 {
    2_000
}

fn default_run_migrations() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_keep_a_small_pool_with_bounded_statements() {
        let config = DatabaseConfig::default();
        assert_eq!((config.min_connections, config.max_connections), (1, 10));
        assert_eq!(config.acquire_timeout(), Duration::from_secs(5));
        assert_eq!(config.statement_timeout_ms, 5_000);
        assert!(config.lock_timeout_ms < config.statement_timeout_ms);
    }

    #[test]
    fn accepts_both_postgres_schemes() {
        assert!(ledger("postgres://svc@db/payments").validate().is_ok());
        assert!(ledger("postgresql://svc@db/payments").validate().is_ok());
    }

    #[test]
    fn rejects_missing_or_foreign_urls() {
        assert_eq!(
            DatabaseConfig::default().validate(),
            Err(ValidationError::MissingRequired("DATABASE__URL"))
        );
        assert_eq!(
            ledger("mysql://db/payments").validate(),
            Err(ValidationError::InvalidDatabaseUrl)
        );
    }

    #[test]
    fn rejects_inverted_or_empty_pools() {
        let inverted = DatabaseConfig {
            min_connections: 8,
            max_connections: 4,
            ..ledger("postgres://db/payments")
        };
        assert_eq!(inverted.validate(), Err(ValidationError::InvalidPoolSize));

        let empty = DatabaseConfig {
            min_connections: 0,
            max_connections: 0,
            ..ledger("postgres://db/payments")
        };
        assert_eq!(empty.validate(), Err(ValidationError::InvalidPoolSize));

        let huge = DatabaseConfig {
            max_connections: 250,
            ..ledger("postgres://db/payments")
        };
        assert_eq!(huge.validate(), Err(ValidationError::PoolSizeTooLarge));
    }

    #[test]
    fn lock_wait_cannot_outlast_the_statement() {
        let config = DatabaseConfig {
            statement_timeout_ms: 1_000,
            lock_timeout_ms: 3_000,
            ..ledger("postgres://db/payments")
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPaymentTiming(_))
        ));
    }

    #[test]
    fn connect_options_parse_the_url() {
        let options = ledger("postgres://svc:pw@db.internal:6432/payments")
            .connect_options()
            .unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_database(), Some("payments"));
    }

    #[test]
    fn redacted_url_masks_the_password() {
        assert_eq!(
            ledger("postgres://svc:hunter2@db:5432/payments").redacted_url(),
            "postgres://svc:***@db:5432/payments"
        );
        assert_eq!(
            ledger("postgres://db/payments").redacted_url(),
            "postgres://db/payments"
        );
    }
}
