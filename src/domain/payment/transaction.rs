//! Transaction aggregate - the ledger's unit of truth for a purchase attempt.
//!
//! Transactions are created `pending` when a provider order is opened and are
//! only ever moved forward through `TransactionStatus`. They are never deleted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Money, PaymentError, ProviderKind, TransactionStatus};
use crate::domain::catalog::{CatalogEntry, ProductType};
use crate::domain::foundation::{ProductId, StateMachine, Timestamp, TransactionId, UserId};

/// Reference to the catalog item being bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_type: ProductType,
    pub product_id: ProductId,
    pub name: String,
}

impl From<&CatalogEntry> for ProductRef {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            product_type: entry.product_type,
            product_id: entry.product_id.clone(),
            name: entry.name.clone(),
        }
    }
}

/// Ledger entry for one purchase attempt.
///
/// # Invariants
///
/// - `amount` was resolved from the catalog, never taken from client input
/// - `(provider, provider_order_id)` is unique across the ledger
/// - `capture_id` and `paid_at` are set iff the transaction reached `completed`
/// - `refunded_at` is set iff the transaction reached `refunded`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub provider: ProviderKind,
    pub provider_order_id: String,
    pub capture_id: Option<String>,
    pub refund_id: Option<String>,
    pub amount: Money,
    pub status: TransactionStatus,
    pub product: ProductRef,
    pub metadata: BTreeMap<String, String>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub paid_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    pub refunded_at: Option<Timestamp>,
}

impl Transaction {
    /// Opens a new `pending` transaction for a freshly created provider order.
    pub fn open(
        user_id: UserId,
        provider: ProviderKind,
        provider_order_id: impl Into<String>,
        amount: Money,
        product: ProductRef,
        now: Timestamp,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("product_id".to_string(), product.product_id.to_string());
        metadata.insert("product_name".to_string(), product.name.clone());
        metadata.insert(
            "product_type".to_string(),
            product.product_type.as_str().to_string(),
        );

        Self {
            id: TransactionId::new(),
            user_id,
            provider,
            provider_order_id: provider_order_id.into(),
            capture_id: None,
            refund_id: None,
            amount,
            status: TransactionStatus::Pending,
            product,
            metadata,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            failed_at: None,
            refunded_at: None,
        }
    }

    /// `pending -> completed`, recording the provider capture.
    pub fn complete(&mut self, capture_id: impl Into<String>, at: Timestamp) -> Result<(), PaymentError> {
        self.advance(TransactionStatus::Completed)?;
        self.capture_id = Some(capture_id.into());
        self.paid_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// `pending -> failed` with a human-readable reason.
    pub fn fail(&mut self, reason: impl Into<String>, at: Timestamp) -> Result<(), PaymentError> {
        self.advance(TransactionStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.failed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// `completed -> refunded`.
    pub fn refund(&mut self, refund_id: Option<String>, at: Timestamp) -> Result<(), PaymentError> {
        self.advance(TransactionStatus::Refunded)?;
        self.refund_id = refund_id;
        self.refunded_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Merges extra metadata, overwriting existing keys.
    pub fn merge_metadata<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.metadata.insert(k.into(), v.into());
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// True if the transaction has sat in `pending` since before `cutoff`.
    pub fn is_stale(&self, cutoff: &Timestamp) -> bool {
        self.is_pending() && self.created_at.is_before(cutoff)
    }

    fn advance(&mut self, target: TransactionStatus) -> Result<(), PaymentError> {
        match self.status.transition_to(target) {
            Ok(next) => {
                self.status = next;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    transaction_id = %self.id,
                    provider = %self.provider,
                    provider_order_id = %self.provider_order_id,
                    from = %err.from,
                    to = %err.to,
                    "Rejected ledger transition"
                );
                Err(PaymentError::InvalidTransition {
                    from: err.from,
                    to: err.to,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Currency;

    fn test_product() -> ProductRef {
        ProductRef {
            product_type: ProductType::Course,
            product_id: ProductId::new("course-42").unwrap(),
            name: "Course 42".to_string(),
        }
    }

    fn pending() -> Transaction {
        Transaction::open(
            UserId::new("user-1").unwrap(),
            ProviderKind::PayPal,
            "ORDER-1",
            Money::major(100, Currency::Eur),
            test_product(),
            Timestamp::from_unix_secs(1_700_000_000).unwrap(),
        )
    }

    #[test]
    fn open_creates_pending_with_product_metadata() {
        let tx = pending();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.capture_id.is_none());
        assert_eq!(tx.metadata.get("product_id").map(String::as_str), Some("course-42"));
        assert_eq!(tx.metadata.get("product_type").map(String::as_str), Some("course"));
    }

    #[test]
    fn complete_records_capture_and_paid_at() {
        let mut tx = pending();
        let at = Timestamp::from_unix_secs(1_700_000_060).unwrap();

        tx.complete("CAP-1", at).unwrap();

        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.capture_id.as_deref(), Some("CAP-1"));
        assert_eq!(tx.paid_at, Some(at));
        assert_eq!(tx.updated_at, at);
    }

    #[test]
    fn fail_records_reason() {
        let mut tx = pending();
        tx.fail("denied", Timestamp::now()).unwrap();

        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.failure_reason.as_deref(), Some("denied"));
        assert!(tx.failed_at.is_some());
    }

    #[test]
    fn refund_requires_completion() {
        let mut tx = pending();
        let err = tx.refund(None, Timestamp::now()).unwrap_err();
        assert_eq!(
            err,
            PaymentError::InvalidTransition {
                from: TransactionStatus::Pending,
                to: TransactionStatus::Refunded,
            }
        );
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn refund_after_completion_sets_refunded_at() {
        let mut tx = pending();
        tx.complete("CAP-1", Timestamp::now()).unwrap();
        tx.refund(Some("RF-1".to_string()), Timestamp::now()).unwrap();

        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.refund_id.as_deref(), Some("RF-1"));
        assert!(tx.refunded_at.is_some());
    }

    #[test]
    fn failed_transaction_cannot_be_completed() {
        let mut tx = pending();
        tx.fail("expired", Timestamp::now()).unwrap();

        let result = tx.complete("CAP-late", Timestamp::now());

        assert!(matches!(result, Err(PaymentError::InvalidTransition { .. })));
        assert!(tx.capture_id.is_none());
    }

    #[test]
    fn completing_twice_is_rejected_without_overwriting_capture() {
        let mut tx = pending();
        tx.complete("CAP-1", Timestamp::now()).unwrap();

        assert!(tx.complete("CAP-2", Timestamp::now()).is_err());
        assert_eq!(tx.capture_id.as_deref(), Some("CAP-1"));
    }

    #[test]
    fn staleness_depends_on_cutoff_and_status() {
        let tx = pending();
        let later = tx.created_at.plus_secs(3_600);
        assert!(tx.is_stale(&later));
        assert!(!tx.is_stale(&tx.created_at));

        let mut done = pending();
        done.complete("CAP", Timestamp::now()).unwrap();
        assert!(!done.is_stale(&later));
    }

    #[test]
    fn merge_metadata_overwrites_keys() {
        let mut tx = pending();
        tx.merge_metadata([("product_name", "Renamed"), ("coupon", "SPRING")]);
        assert_eq!(tx.metadata.get("product_name").map(String::as_str), Some("Renamed"));
        assert_eq!(tx.metadata.get("coupon").map(String::as_str), Some("SPRING"));
    }
}
