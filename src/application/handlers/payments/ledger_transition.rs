//! Conditional ledger transitions shared by capture, refund, webhooks and expiry.
//!
//! Every status change goes through `apply_change`: the domain transition is
//! validated on a copy, then written with `update_if_status` keyed on the
//! status the copy was read in. A conflict whose current status already equals
//! the target counts as applied, so concurrent deliveries converge.

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::payment::{PaymentError, PaymentEventKind, Transaction, TransactionStatus};
use crate::ports::{TransactionRepository, TransitionOutcome};

/// A forward move of a ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    Complete { capture_id: String },
    Fail { reason: String },
    Refund { refund_id: Option<String> },
}

impl LedgerChange {
    /// Change a verified provider event asks for, if any.
    pub fn from_event(kind: &PaymentEventKind) -> Option<Self> {
        match kind {
            PaymentEventKind::CaptureCompleted { capture_id } => Some(LedgerChange::Complete {
                capture_id: capture_id.clone(),
            }),
            PaymentEventKind::CaptureDenied { reason } => Some(LedgerChange::Fail {
                reason: reason.clone(),
            }),
            PaymentEventKind::CaptureRefunded { refund_id } => Some(LedgerChange::Refund {
                refund_id: refund_id.clone(),
            }),
            PaymentEventKind::OrderApproved | PaymentEventKind::Unrecognized => None,
        }
    }

    pub fn target(&self) -> TransactionStatus {
        match self {
            LedgerChange::Complete { .. } => TransactionStatus::Completed,
            LedgerChange::Fail { .. } => TransactionStatus::Failed,
            LedgerChange::Refund { .. } => TransactionStatus::Refunded,
        }
    }

    fn apply(&self, transaction: &mut Transaction, at: Timestamp) -> Result<(), PaymentError> {
        match self {
            LedgerChange::Complete { capture_id } => transaction.complete(capture_id.clone(), at),
            LedgerChange::Fail { reason } => transaction.fail(reason.clone(), at),
            LedgerChange::Refund { refund_id } => transaction.refund(refund_id.clone(), at),
        }
    }
}

/// What happened to the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// This call moved the row; carries the stored transaction.
    Applied(Transaction),

    /// The row was already in the target status. Nothing was written.
    AlreadyApplied(Transaction),

    /// The state machine forbids the move from `current`.
    Rejected {
        current: TransactionStatus,
        target: TransactionStatus,
    },
}

impl TransitionResult {
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            TransitionResult::Applied(tx) | TransitionResult::AlreadyApplied(tx) => Some(tx),
            TransitionResult::Rejected { .. } => None,
        }
    }
}

/// Applies `change` to `transaction` with compare-and-set on its current status.
///
/// Storage errors, including a violated one-completed-purchase constraint,
/// are returned as-is.
pub async fn apply_change(
    repository: &dyn TransactionRepository,
    transaction: Transaction,
    change: &LedgerChange,
    at: Timestamp,
) -> Result<TransitionResult, DomainError> {
    let expected = transaction.status;
    let target = change.target();

    if expected == target {
        return Ok(TransitionResult::AlreadyApplied(transaction));
    }

    let mut next = transaction.clone();
    if change.apply(&mut next, at).is_err() {
        return Ok(TransitionResult::Rejected {
            current: expected,
            target,
        });
    }

    match repository.update_if_status(&next, expected).await? {
        TransitionOutcome::Applied => Ok(TransitionResult::Applied(next)),
        TransitionOutcome::Conflict { current } if current == target => {
            tracing::debug!(
                transaction_id = %transaction.id,
                status = %current,
                "Concurrent writer already applied transition"
            );
            let stored = repository
                .find_by_id(&transaction.id)
                .await?
                .unwrap_or(next);
            Ok(TransitionResult::AlreadyApplied(stored))
        }
        TransitionOutcome::Conflict { current } => {
            tracing::warn!(
                transaction_id = %transaction.id,
                expected = %expected,
                current = %current,
                target = %target,
                "Ledger row moved before transition could be written"
            );
            Ok(TransitionResult::Rejected { current, target })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTransactionRepository;
    use crate::domain::catalog::Catalog;
    use crate::domain::foundation::UserId;
    use crate::domain::payment::{Currency, Money, ProductRef, ProviderKind};

    fn pending() -> Transaction {
        Transaction::open(
            UserId::new("user-1").unwrap(),
            ProviderKind::Card,
            "card_order_1",
            Money::major(100, Currency::Eur),
            ProductRef::from(Catalog::standard().lookup("course-42").unwrap()),
            Timestamp::now(),
        )
    }

    fn complete() -> LedgerChange {
        LedgerChange::Complete {
            capture_id: "cap_1".into(),
        }
    }

    #[tokio::test]
    async fn applies_valid_transition() {
        let repo = InMemoryTransactionRepository::new();
        let tx = pending();
        repo.create(&tx).await.unwrap();

        let result = apply_change(&repo, tx.clone(), &complete(), Timestamp::now())
            .await
            .unwrap();

        let stored = repo.find_by_id(&tx.id).await.unwrap().unwrap();
        assert!(matches!(result, TransitionResult::Applied(_)));
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert_eq!(stored.capture_id.as_deref(), Some("cap_1"));
    }

    #[tokio::test]
    async fn stale_copy_in_target_state_counts_as_applied() {
        let repo = InMemoryTransactionRepository::new();
        let tx = pending();
        repo.create(&tx).await.unwrap();

        apply_change(&repo, tx.clone(), &complete(), Timestamp::now())
            .await
            .unwrap();
        // Second writer still holds the pending copy.
        let second = apply_change(&repo, tx.clone(), &complete(), Timestamp::now())
            .await
            .unwrap();

        match second {
            TransitionResult::AlreadyApplied(stored) => {
                assert_eq!(stored.status, TransactionStatus::Completed)
            }
            other => panic!("expected AlreadyApplied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn forbidden_transition_is_rejected_without_write() {
        let repo = InMemoryTransactionRepository::new();
        let tx = pending();
        repo.create(&tx).await.unwrap();

        let result = apply_change(
            &repo,
            tx.clone(),
            &LedgerChange::Refund { refund_id: None },
            Timestamp::now(),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            TransitionResult::Rejected {
                current: TransactionStatus::Pending,
                target: TransactionStatus::Refunded,
            }
        );
        let stored = repo.find_by_id(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn conflict_with_other_state_is_rejected() {
        let repo = InMemoryTransactionRepository::new();
        let tx = pending();
        repo.create(&tx).await.unwrap();

        apply_change(
            &repo,
            tx.clone(),
            &LedgerChange::Fail {
                reason: "expired".into(),
            },
            Timestamp::now(),
        )
        .await
        .unwrap();
        let late = apply_change(&repo, tx, &complete(), Timestamp::now())
            .await
            .unwrap();

        assert_eq!(
            late,
            TransitionResult::Rejected {
                current: TransactionStatus::Failed,
                target: TransactionStatus::Completed,
            }
        );
    }

    #[test]
    fn approval_events_carry_no_change() {
        assert_eq!(LedgerChange::from_event(&PaymentEventKind::OrderApproved), None);
        assert_eq!(
            LedgerChange::from_event(&PaymentEventKind::CaptureDenied {
                reason: "insufficient funds".into()
            })
            .map(|c| c.target()),
            Some(TransactionStatus::Failed)
        );
    }
}
