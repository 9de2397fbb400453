//! In-memory transaction ledger for tests and local development.
//!
//! Enforces the same uniqueness rules as the Postgres schema:
//! `(provider, provider_order_id)` is unique, and while purchase-once is on a
//! user holds at most one `completed` transaction per product.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{
    DomainError, ErrorCode, ProductId, Timestamp, TransactionId, UserId,
};
use crate::domain::payment::{ProviderKind, Transaction, TransactionStatus};
use crate::ports::{LedgerStats, PendingCursor, TransactionRepository, TransitionOutcome};

#[derive(Debug, Clone)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
    single_purchase: bool,
}

impl Default for InMemoryTransactionRepository {
    fn default() -> Self {
        Self {
            transactions: Arc::default(),
            single_purchase: true,
        }
    }
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// With `false`, a second `completed` row for the same user and product
    /// is stored like any other.
    pub fn with_single_purchase(mut self, enforce: bool) -> Self {
        self.single_purchase = enforce;
        self
    }

    /// Snapshot of every row (for test assertions).
    pub async fn all(&self) -> Vec<Transaction> {
        let mut rows: Vec<_> = self.transactions.read().await.values().cloned().collect();
        rows.sort_by_key(|t| t.created_at);
        rows
    }

    fn completed_conflict(
        &self,
        rows: &HashMap<TransactionId, Transaction>,
        candidate: &Transaction,
    ) -> bool {
        self.single_purchase
            && candidate.status == TransactionStatus::Completed
            && rows.values().any(|t| {
                t.id != candidate.id
                    && t.status == TransactionStatus::Completed
                    && t.user_id == candidate.user_id
                    && t.product.product_id == candidate.product.product_id
            })
    }

    fn already_purchased(transaction: &Transaction) -> DomainError {
        DomainError::new(
            ErrorCode::AlreadyPurchased,
            format!(
                "User already purchased {}",
                transaction.product.product_id
            ),
        )
        .with_detail("product_id", transaction.product.product_id.to_string())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create(&self, transaction: &Transaction) -> Result<(), DomainError> {
        let mut rows = self.transactions.write().await;

        let duplicate_order = rows.values().any(|t| {
            t.provider == transaction.provider
                && t.provider_order_id == transaction.provider_order_id
        });
        if duplicate_order || rows.contains_key(&transaction.id) {
            return Err(DomainError::new(
                ErrorCode::DuplicateProviderOrder,
                format!(
                    "Order {} already recorded for {}",
                    transaction.provider_order_id, transaction.provider
                ),
            ));
        }

        if self.completed_conflict(&rows, transaction) {
            return Err(Self::already_purchased(transaction));
        }

        rows.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, DomainError> {
        Ok(self.transactions.read().await.get(id).cloned())
    }

    async fn find_by_provider_order(
        &self,
        provider: ProviderKind,
        provider_order_id: &str,
    ) -> Result<Option<Transaction>, DomainError> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|t| t.provider == provider && t.provider_order_id == provider_order_id)
            .cloned())
    }

    async fn find_by_capture_id(
        &self,
        provider: Option<ProviderKind>,
        capture_id: &str,
    ) -> Result<Option<Transaction>, DomainError> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|t| {
                t.capture_id.as_deref() == Some(capture_id)
                    && provider.map_or(true, |p| t.provider == p)
            })
            .cloned())
    }

    async fn has_completed_purchase(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<bool, DomainError> {
        Ok(self.transactions.read().await.values().any(|t| {
            t.status == TransactionStatus::Completed
                && &t.user_id == user_id
                && &t.product.product_id == product_id
        }))
    }

    async fn update_if_status(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> Result<TransitionOutcome, DomainError> {
        let mut rows = self.transactions.write().await;

        let current = rows
            .get(&transaction.id)
            .map(|t| t.status)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::TransactionNotFound,
                    format!("Transaction {} not found", transaction.id),
                )
            })?;

        if current != expected {
            return Ok(TransitionOutcome::Conflict { current });
        }

        if self.completed_conflict(&rows, transaction) {
            return Err(Self::already_purchased(transaction));
        }

        rows.insert(transaction.id, transaction.clone());
        Ok(TransitionOutcome::Applied)
    }

    async fn find_pending_older_than(
        &self,
        cutoff: Timestamp,
        after: Option<PendingCursor>,
        limit: u32,
    ) -> Result<Vec<Transaction>, DomainError> {
        let after = after.map(|c| (c.created_at, c.id));
        let rows = self.transactions.read().await;
        let mut stale: Vec<Transaction> = rows
            .values()
            .filter(|t| t.is_stale(&cutoff))
            .filter(|t| after.map_or(true, |pos| (t.created_at, t.id) > pos))
            .cloned()
            .collect();
        stale.sort_by_key(|t| (t.created_at, t.id));
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Transaction>, DomainError> {
        let rows = self.transactions.read().await;
        let mut mine: Vec<Transaction> = rows
            .values()
            .filter(|t| &t.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mine.truncate(limit as usize);
        Ok(mine)
    }

    async fn stats(&self) -> Result<LedgerStats, DomainError> {
        let rows = self.transactions.read().await;
        let mut stats = LedgerStats::default();

        for t in rows.values() {
            stats.total += 1;
            match t.status {
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::Completed => {
                    stats.completed += 1;
                    *stats.revenue_minor.entry(t.amount.currency()).or_insert(0) +=
                        t.amount.amount_minor();
                }
                TransactionStatus::Failed => stats.failed += 1,
                TransactionStatus::Refunded => stats.refunded += 1,
            }
        }
        Ok(stats)
    }
}
