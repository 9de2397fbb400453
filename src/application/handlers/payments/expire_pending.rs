//! ExpirePendingHandler - Command handler that fails abandoned orders.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::adapters::providers::ProviderRegistry;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::payment::{Transaction, EXPIRED_REASON};
use crate::ports::{PendingCursor, ProviderOrderStatus, TransactionRepository};

use super::ledger_transition::{apply_change, LedgerChange, TransitionResult};

/// Pending transactions older than this are failed.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Rows examined per sweep.
pub const DEFAULT_EXPIRY_BATCH_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct ExpirePendingCommand {
    pub now: Timestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirePendingResult {
    pub expired: u32,
    pub skipped: u32,
}

/// Fails `pending` transactions that sat past the timeout.
///
/// Before failing a row the provider is asked for the order status; orders the
/// provider reports as captured or in flight are left for the webhook.
/// Provider errors do not block expiry.
///
/// Each sweep examines one batch and resumes after the last row it saw, so
/// rows left pending on purpose cannot starve the ones behind them. After the
/// tail of the stale set the scan wraps to the oldest row.
pub struct ExpirePendingHandler {
    repository: Arc<dyn TransactionRepository>,
    providers: ProviderRegistry,
    timeout: Duration,
    batch_size: u32,
    cursor: Mutex<Option<PendingCursor>>,
}

impl ExpirePendingHandler {
    pub fn new(repository: Arc<dyn TransactionRepository>, providers: ProviderRegistry) -> Self {
        Self {
            repository,
            providers,
            timeout: DEFAULT_PENDING_TIMEOUT,
            batch_size: DEFAULT_EXPIRY_BATCH_SIZE,
            cursor: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn handle(&self, cmd: ExpirePendingCommand) -> Result<ExpirePendingResult, DomainError> {
        let cutoff = cmd.now.minus_secs(self.timeout.as_secs());
        let stale = self.next_batch(cutoff).await?;

        let mut result = ExpirePendingResult::default();
        for transaction in stale {
            if self.in_flight_at_provider(&transaction).await {
                result.skipped += 1;
                continue;
            }

            let transaction_id = transaction.id;
            let change = LedgerChange::Fail {
                reason: EXPIRED_REASON.to_string(),
            };
            match apply_change(self.repository.as_ref(), transaction, &change, cmd.now).await {
                Ok(TransitionResult::Applied(tx)) => {
                    tracing::info!(
                        transaction_id = %tx.id,
                        provider = %tx.provider,
                        provider_order_id = %tx.provider_order_id,
                        "Expired pending transaction"
                    );
                    result.expired += 1;
                }
                Ok(_) => result.skipped += 1,
                Err(err) => {
                    tracing::error!(
                        transaction_id = %transaction_id,
                        error = %err,
                        "Failed to expire transaction"
                    );
                    result.skipped += 1;
                }
            }
        }

        if result.expired > 0 || result.skipped > 0 {
            tracing::info!(
                expired = result.expired,
                skipped = result.skipped,
                "Expiry sweep finished"
            );
        }
        Ok(result)
    }

    async fn next_batch(&self, cutoff: Timestamp) -> Result<Vec<Transaction>, DomainError> {
        let start = *self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let mut batch = self
            .repository
            .find_pending_older_than(cutoff, start, self.batch_size)
            .await?;
        if batch.is_empty() && start.is_some() {
            batch = self
                .repository
                .find_pending_older_than(cutoff, None, self.batch_size)
                .await?;
        }

        let next = if batch.len() < self.batch_size as usize {
            None
        } else {
            batch.last().map(PendingCursor::after)
        };
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(batch)
    }

    async fn in_flight_at_provider(&self, transaction: &Transaction) -> bool {
        let Ok(provider) = self.providers.get(transaction.provider) else {
            return false;
        };
        match provider.get_status(&transaction.provider_order_id).await {
            Ok(ProviderOrderStatus::Completed | ProviderOrderStatus::Processing) => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    provider = %transaction.provider,
                    provider_order_id = %transaction.provider_order_id,
                    "Stale transaction still active at provider; leaving pending"
                );
                true
            }
            Ok(_) => false,
            Err(err) => {
                tracing::debug!(
                    transaction_id = %transaction.id,
                    error = %err,
                    "Status check failed; expiring anyway"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTransactionRepository;
    use crate::adapters::providers::MockPaymentProvider;
    use crate::domain::catalog::Catalog;
    use crate::domain::foundation::UserId;
    use crate::domain::payment::{
        Currency, Money, PaymentError, ProductRef, ProviderKind, TransactionStatus,
    };

    struct Fixture {
        handler: ExpirePendingHandler,
        repo: InMemoryTransactionRepository,
        provider: Arc<MockPaymentProvider>,
    }

    fn fixture() -> Fixture {
        let repo = InMemoryTransactionRepository::new();
        let provider = Arc::new(MockPaymentProvider::new(ProviderKind::Card));
        let handler = ExpirePendingHandler::new(
            Arc::new(repo.clone()),
            ProviderRegistry::new().with(provider.clone()),
        );
        Fixture {
            handler,
            repo,
            provider,
        }
    }

    async fn pending_at(f: &Fixture, order: &str, created_at: Timestamp) -> Transaction {
        let tx = Transaction::open(
            UserId::new("user-1").unwrap(),
            ProviderKind::Card,
            order,
            Money::major(100, Currency::Eur),
            ProductRef::from(Catalog::standard().lookup("course-42").unwrap()),
            created_at,
        );
        f.repo.create(&tx).await.unwrap();
        tx
    }

    #[tokio::test]
    async fn fails_transactions_past_timeout() {
        let f = fixture();
        let now = Timestamp::now();
        let stale = pending_at(&f, "card_order_1", now.minus_minutes(31)).await;
        let fresh = pending_at(&f, "card_order_2", now.minus_minutes(5)).await;

        let result = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();

        assert_eq!(result, ExpirePendingResult { expired: 1, skipped: 0 });
        let stale = f.repo.find_by_id(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, TransactionStatus::Failed);
        assert_eq!(stale.failure_reason.as_deref(), Some(EXPIRED_REASON));
        let fresh = f.repo.find_by_id(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn second_sweep_finds_nothing() {
        let f = fixture();
        let now = Timestamp::now();
        pending_at(&f, "card_order_1", now.minus_minutes(45)).await;

        f.handler.handle(ExpirePendingCommand { now }).await.unwrap();
        let again = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();

        assert_eq!(again, ExpirePendingResult::default());
    }

    #[tokio::test]
    async fn order_captured_at_provider_is_left_pending() {
        let f = fixture();
        let now = Timestamp::now();
        let tx = pending_at(&f, "card_order_1", now.minus_minutes(45)).await;
        f.provider
            .set_order_status("card_order_1", ProviderOrderStatus::Completed);

        let result = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();

        assert_eq!(result, ExpirePendingResult { expired: 0, skipped: 1 });
        let stored = f.repo.find_by_id(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn provider_outage_does_not_block_expiry() {
        let f = fixture();
        let now = Timestamp::now();
        pending_at(&f, "card_order_1", now.minus_minutes(45)).await;
        f.provider.fail_next(
            "get_status",
            1,
            PaymentError::provider_unavailable(ProviderKind::Card, "503"),
        );

        let result = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();

        assert_eq!(result.expired, 1);
    }

    #[tokio::test]
    async fn custom_timeout_and_batch_are_honored() {
        let mut f = fixture();
        f.handler = f
            .handler
            .with_timeout(Duration::from_secs(10 * 60))
            .with_batch_size(1);
        let now = Timestamp::now();
        pending_at(&f, "card_order_1", now.minus_minutes(20)).await;
        pending_at(&f, "card_order_2", now.minus_minutes(15)).await;

        let result = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();

        assert_eq!(result.expired, 1);
    }

    #[tokio::test]
    async fn orders_left_pending_do_not_starve_newer_ones() {
        let mut f = fixture();
        f.handler = f.handler.with_batch_size(2);
        let now = Timestamp::now();
        for (order, age) in [("card_order_1", 90), ("card_order_2", 80)] {
            pending_at(&f, order, now.minus_minutes(age)).await;
            f.provider.set_order_status(order, ProviderOrderStatus::Processing);
        }
        let abandoned = pending_at(&f, "card_order_3", now.minus_minutes(60)).await;

        let first = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();
        let second = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();

        assert_eq!(first, ExpirePendingResult { expired: 0, skipped: 2 });
        assert_eq!(second, ExpirePendingResult { expired: 1, skipped: 0 });
        let stored = f.repo.find_by_id(&abandoned.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn scan_wraps_to_the_oldest_row_after_the_tail() {
        let mut f = fixture();
        f.handler = f.handler.with_batch_size(1);
        let now = Timestamp::now();
        pending_at(&f, "card_order_1", now.minus_minutes(90)).await;
        f.provider
            .set_order_status("card_order_1", ProviderOrderStatus::Processing);

        // Full batch leaves the cursor on the row; the next sweep wraps.
        for _ in 0..2 {
            let result = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();
            assert_eq!(result, ExpirePendingResult { expired: 0, skipped: 1 });
        }

        f.provider
            .set_order_status("card_order_1", ProviderOrderStatus::Created);
        let result = f.handler.handle(ExpirePendingCommand { now }).await.unwrap();
        assert_eq!(result.expired, 1);
    }
}
