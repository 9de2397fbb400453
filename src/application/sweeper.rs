//! Sweeper - Background housekeeping for the payment ledger.
//!
//! Two jobs on independent intervals:
//!
//! | Job | Default interval | What it does |
//! |-----|------------------|--------------|
//! | expiry | 300s | Fails `pending` transactions past the payment timeout |
//! | purge | 3600s | Drops expired idempotency records and webhook events older than the retention |
//!
//! A failing job is logged and retried on the next tick; it never stops the loop.
//!
//! ## Graceful Shutdown
//!
//! The sweeper listens on a `watch` channel and returns once `true` is sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::application::handlers::payments::{
    ExpirePendingCommand, ExpirePendingHandler, ExpirePendingResult,
};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{IdempotencyStore, WebhookEventRepository};

/// Configuration for the Sweeper service.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to expire stale pending transactions.
    pub expiry_interval: Duration,

    /// How often to purge idempotency records and old webhook events.
    pub purge_interval: Duration,

    /// Webhook events processed longer ago than this are deleted.
    pub webhook_retention_days: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            expiry_interval: Duration::from_secs(300),
            purge_interval: Duration::from_secs(3600),
            webhook_retention_days: 30,
        }
    }
}

impl SweeperConfig {
    pub fn with_expiry_interval(mut self, interval: Duration) -> Self {
        self.expiry_interval = interval;
        self
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }
}

/// Counts removed by one purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeResult {
    pub idempotency_records: u64,
    pub webhook_events: u64,
}

pub struct Sweeper {
    expire: ExpirePendingHandler,
    idempotency: Arc<dyn IdempotencyStore>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(
        expire: ExpirePendingHandler,
        idempotency: Arc<dyn IdempotencyStore>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            expire,
            idempotency,
            webhook_events,
            config,
        }
    }

    /// Run both jobs until the shutdown signal is received.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut expiry = time::interval(self.config.expiry_interval);
        let mut purge = time::interval(self.config.purge_interval);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        purge.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            expiry_interval_secs = self.config.expiry_interval.as_secs(),
            purge_interval_secs = self.config.purge_interval.as_secs(),
            "Sweeper started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Sweeper stopped");
                        return;
                    }
                }

                _ = expiry.tick() => {
                    if let Err(err) = self.expire_once(Timestamp::now()).await {
                        tracing::error!(error = %err, "Expiry sweep failed");
                    }
                }

                _ = purge.tick() => {
                    if let Err(err) = self.purge_once(Timestamp::now()).await {
                        tracing::error!(error = %err, "Purge sweep failed");
                    }
                }
            }
        }
    }

    pub async fn expire_once(&self, now: Timestamp) -> Result<ExpirePendingResult, DomainError> {
        self.expire.handle(ExpirePendingCommand { now }).await
    }

    pub async fn purge_once(&self, now: Timestamp) -> Result<PurgeResult, DomainError> {
        let idempotency_records = self.idempotency.purge_expired(now).await?;
        let webhook_events = self
            .webhook_events
            .delete_before(now.minus_days(self.config.webhook_retention_days))
            .await?;

        if idempotency_records > 0 || webhook_events > 0 {
            tracing::info!(idempotency_records, webhook_events, "Purged expired records");
        }
        Ok(PurgeResult {
            idempotency_records,
            webhook_events,
        })
    }
}
