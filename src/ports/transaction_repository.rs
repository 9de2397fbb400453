//! Transaction ledger port.
//!
//! The ledger is append-only: rows are inserted once and then only updated
//! through `update_if_status`, a compare-and-set on the status column. There
//! is no delete.
//!
//! # Error codes
//!
//! - `ErrorCode::DuplicateProviderOrder` - `(provider, provider_order_id)` already recorded
//! - `ErrorCode::AlreadyPurchased` - a second `completed` row for the same user and product
//!   while purchase-once is enforced
//! - `ErrorCode::DatabaseError` - storage unavailable; callers must fail closed

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::foundation::{DomainError, ProductId, Timestamp, TransactionId, UserId};
use crate::domain::payment::{Currency, ProviderKind, Transaction, TransactionStatus};

/// Outcome of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The row was in the expected state and has been updated.
    Applied,
    /// The row had moved on; nothing was written.
    Conflict { current: TransactionStatus },
}

/// Keyset position in the stale-pending scan: rows strictly after
/// `(created_at, id)` come next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCursor {
    pub created_at: Timestamp,
    pub id: TransactionId,
}

impl PendingCursor {
    pub fn after(transaction: &Transaction) -> Self {
        Self {
            created_at: transaction.created_at,
            id: transaction.id,
        }
    }
}

/// Aggregate ledger figures for the admin stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub refunded: u64,

    /// Sum of `completed` amounts per currency, in minor units.
    pub revenue_minor: BTreeMap<Currency, i64>,
}

/// Port for the transaction ledger.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a new transaction.
    async fn create(&self, transaction: &Transaction) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, DomainError>;

    /// Lookup by the provider's order id (unique per provider).
    async fn find_by_provider_order(
        &self,
        provider: ProviderKind,
        provider_order_id: &str,
    ) -> Result<Option<Transaction>, DomainError>;

    /// Lookup by the provider's capture id (refund flows only know this).
    async fn find_by_capture_id(
        &self,
        provider: Option<ProviderKind>,
        capture_id: &str,
    ) -> Result<Option<Transaction>, DomainError>;

    /// True if the user holds a `completed` transaction for the product.
    async fn has_completed_purchase(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<bool, DomainError>;

    /// Persist `transaction` only if the stored status still equals `expected`.
    async fn update_if_status(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> Result<TransitionOutcome, DomainError>;

    /// `pending` transactions created strictly before `cutoff`, ordered by
    /// `(created_at, id)` and starting after `after` when given.
    async fn find_pending_older_than(
        &self,
        cutoff: Timestamp,
        after: Option<PendingCursor>,
        limit: u32,
    ) -> Result<Vec<Transaction>, DomainError>;

    /// Most recent transactions of a user, newest first.
    async fn list_for_user(&self, user_id: &UserId, limit: u32)
        -> Result<Vec<Transaction>, DomainError>;

    async fn stats(&self) -> Result<LedgerStats, DomainError>;
}
