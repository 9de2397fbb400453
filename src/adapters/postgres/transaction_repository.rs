//! PostgreSQL implementation of TransactionRepository.
//!
//! Status changes are compare-and-set on the `status` column, so concurrent
//! webhook deliveries and sweeper runs cannot both move the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::catalog::ProductType;
use crate::domain::foundation::{
    DomainError, ErrorCode, ProductId, Timestamp, TransactionId, UserId,
};
use crate::domain::payment::{
    Currency, Money, ProductRef, ProviderKind, Transaction, TransactionStatus,
};
use crate::ports::{LedgerStats, PendingCursor, TransactionRepository, TransitionOutcome};

const PROVIDER_ORDER_CONSTRAINT: &str = "payment_transactions_provider_order_key";
const ONE_COMPLETED_INDEX: &str = "payment_transactions_one_completed_per_product";

const SELECT_COLUMNS: &str = r#"
    id, user_id, provider, provider_order_id, capture_id, refund_id,
    amount_minor, currency, status, product_type, product_id, product_name,
    metadata, failure_reason, created_at, updated_at, paid_at, failed_at, refunded_at
"#;

/// PostgreSQL implementation of the TransactionRepository port.
///
/// Rows are stamped with `purchase_once` at insert; only stamped rows take
/// part in the one-completed-per-product index.
pub struct PostgresTransactionRepository {
    pool: PgPool,
    single_purchase: bool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            single_purchase: true,
        }
    }

    pub fn with_single_purchase(mut self, enforce: bool) -> Self {
        self.single_purchase = enforce;
        self
    }
}

/// Database row representation of a transaction.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: String,
    provider: String,
    provider_order_id: String,
    capture_id: Option<String>,
    refund_id: Option<String>,
    amount_minor: i64,
    currency: String,
    status: String,
    product_type: String,
    product_id: String,
    product_name: String,
    metadata: Json<BTreeMap<String, String>>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::database(format!("Invalid {} in ledger row: {}", field, err))
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let currency: Currency = row.currency.parse().map_err(|e| corrupt("currency", e))?;

        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            provider: row.provider.parse().map_err(|e| corrupt("provider", e))?,
            provider_order_id: row.provider_order_id,
            capture_id: row.capture_id,
            refund_id: row.refund_id,
            amount: Money::new(row.amount_minor, currency).map_err(|e| corrupt("amount", e))?,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            product: ProductRef {
                product_type: ProductType::parse(&row.product_type)
                    .map_err(|e| corrupt("product_type", e))?,
                product_id: ProductId::new(row.product_id).map_err(|e| corrupt("product_id", e))?,
                name: row.product_name,
            },
            metadata: row.metadata.0,
            failure_reason: row.failure_reason,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            failed_at: row.failed_at.map(Timestamp::from_datetime),
            refunded_at: row.refunded_at.map(Timestamp::from_datetime),
        })
    }
}

fn map_write_error(e: sqlx::Error, transaction: &Transaction, action: &str) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.constraint() {
            Some(PROVIDER_ORDER_CONSTRAINT) => {
                return DomainError::new(
                    ErrorCode::DuplicateProviderOrder,
                    format!(
                        "Order {} already recorded for {}",
                        transaction.provider_order_id, transaction.provider
                    ),
                );
            }
            Some(ONE_COMPLETED_INDEX) => {
                return DomainError::new(
                    ErrorCode::AlreadyPurchased,
                    format!("User already purchased {}", transaction.product.product_id),
                )
                .with_detail("product_id", transaction.product.product_id.to_string());
            }
            _ => {}
        }
    }
    DomainError::database(format!("Failed to {} transaction: {}", action, e))
}

fn rows_into(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>, DomainError> {
    rows.into_iter().map(Transaction::try_from).collect()
}

fn opt_datetime(ts: &Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.as_ref().map(|t| *t.as_datetime())
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, transaction: &Transaction) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, user_id, provider, provider_order_id, capture_id, refund_id,
                amount_minor, currency, status, product_type, product_id, product_name,
                metadata, failure_reason, created_at, updated_at, paid_at, failed_at, refunded_at,
                purchase_once
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.user_id.as_str())
        .bind(transaction.provider.as_str())
        .bind(&transaction.provider_order_id)
        .bind(&transaction.capture_id)
        .bind(&transaction.refund_id)
        .bind(transaction.amount.amount_minor())
        .bind(transaction.amount.currency().code())
        .bind(transaction.status.as_str())
        .bind(transaction.product.product_type.as_str())
        .bind(transaction.product.product_id.as_str())
        .bind(&transaction.product.name)
        .bind(Json(&transaction.metadata))
        .bind(&transaction.failure_reason)
        .bind(transaction.created_at.as_datetime())
        .bind(transaction.updated_at.as_datetime())
        .bind(opt_datetime(&transaction.paid_at))
        .bind(opt_datetime(&transaction.failed_at))
        .bind(opt_datetime(&transaction.refunded_at))
        .bind(self.single_purchase)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, transaction, "create"))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_transactions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch transaction: {}", e)))?;

        row.map(Transaction::try_from).transpose()
    }

    async fn find_by_provider_order(
        &self,
        provider: ProviderKind,
        provider_order_id: &str,
    ) -> Result<Option<Transaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_transactions WHERE provider = $1 AND provider_order_id = $2",
            SELECT_COLUMNS
        ))
        .bind(provider.as_str())
        .bind(provider_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch transaction: {}", e)))?;

        row.map(Transaction::try_from).transpose()
    }

    async fn find_by_capture_id(
        &self,
        provider: Option<ProviderKind>,
        capture_id: &str,
    ) -> Result<Option<Transaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE capture_id = $1 AND ($2::text IS NULL OR provider = $2)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        ))
        .bind(capture_id)
        .bind(provider.map(|p| p.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch transaction: {}", e)))?;

        row.map(Transaction::try_from).transpose()
    }

    async fn has_completed_purchase(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<bool, DomainError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM payment_transactions
                WHERE user_id = $1 AND product_id = $2 AND status = 'completed'
            )
            "#,
        )
        .bind(user_id.as_str())
        .bind(product_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to check purchases: {}", e)))?;

        Ok(exists)
    }

    async fn update_if_status(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> Result<TransitionOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions SET
                status = $3,
                capture_id = $4,
                refund_id = $5,
                metadata = $6,
                failure_reason = $7,
                updated_at = $8,
                paid_at = $9,
                failed_at = $10,
                refunded_at = $11
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(expected.as_str())
        .bind(transaction.status.as_str())
        .bind(&transaction.capture_id)
        .bind(&transaction.refund_id)
        .bind(Json(&transaction.metadata))
        .bind(&transaction.failure_reason)
        .bind(transaction.updated_at.as_datetime())
        .bind(opt_datetime(&transaction.paid_at))
        .bind(opt_datetime(&transaction.failed_at))
        .bind(opt_datetime(&transaction.refunded_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, transaction, "update"))?;

        if result.rows_affected() == 1 {
            return Ok(TransitionOutcome::Applied);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM payment_transactions WHERE id = $1")
                .bind(transaction.id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to read status: {}", e)))?;

        match current {
            Some(status) => Ok(TransitionOutcome::Conflict {
                current: status.parse().map_err(|e| corrupt("status", e))?,
            }),
            None => Err(DomainError::new(
                ErrorCode::TransactionNotFound,
                format!("Transaction {} not found", transaction.id),
            )),
        }
    }

    async fn find_pending_older_than(
        &self,
        cutoff: Timestamp,
        after: Option<PendingCursor>,
        limit: u32,
    ) -> Result<Vec<Transaction>, DomainError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE status = 'pending' AND created_at < $1
              AND ($2::timestamptz IS NULL OR (created_at, id) > ($2, $3))
            ORDER BY created_at ASC, id ASC
            LIMIT $4
            "#,
            SELECT_COLUMNS
        ))
        .bind(cutoff.as_datetime())
        .bind(after.map(|c| *c.created_at.as_datetime()))
        .bind(after.map(|c| *c.id.as_uuid()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch stale transactions: {}", e)))?;

        rows_into(rows)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Transaction>, DomainError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list transactions: {}", e)))?;

        rows_into(rows)
    }

    async fn stats(&self) -> Result<LedgerStats, DomainError> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM payment_transactions GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to count transactions: {}", e)))?;

        let revenue: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT currency, COALESCE(SUM(amount_minor), 0)::BIGINT
            FROM payment_transactions
            WHERE status = 'completed'
            GROUP BY currency
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to sum revenue: {}", e)))?;

        let mut stats = LedgerStats::default();
        for (status, count) in counts {
            let count = count.max(0) as u64;
            stats.total += count;
            match status.parse::<TransactionStatus>().map_err(|e| corrupt("status", e))? {
                TransactionStatus::Pending => stats.pending = count,
                TransactionStatus::Completed => stats.completed = count,
                TransactionStatus::Failed => stats.failed = count,
                TransactionStatus::Refunded => stats.refunded = count,
            }
        }
        for (currency, sum) in revenue {
            let currency: Currency = currency.parse().map_err(|e| corrupt("currency", e))?;
            stats.revenue_minor.insert(currency, sum);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> TransactionRow {
        let now = Utc::now();
        TransactionRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            provider: "paypal".to_string(),
            provider_order_id: "ORDER-1".to_string(),
            capture_id: None,
            refund_id: None,
            amount_minor: 10_000,
            currency: "EUR".to_string(),
            status: "pending".to_string(),
            product_type: "course".to_string(),
            product_id: "course-42".to_string(),
            product_name: "Course 42".to_string(),
            metadata: Json(BTreeMap::from([(
                "product_id".to_string(),
                "course-42".to_string(),
            )])),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            failed_at: None,
            refunded_at: None,
        }
    }

    #[test]
    fn row_converts_to_transaction() {
        let tx = Transaction::try_from(row()).unwrap();

        assert_eq!(tx.provider, ProviderKind::PayPal);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.amount, Money::major(100, Currency::Eur));
        assert_eq!(tx.product.product_type, ProductType::Course);
        assert_eq!(tx.metadata.get("product_id").map(String::as_str), Some("course-42"));
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let mut bad = row();
        bad.status = "settled".to_string();

        let err = Transaction::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn unknown_provider_is_a_database_error() {
        let mut bad = row();
        bad.provider = "bitcoin".to_string();

        let err = Transaction::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    // Integration tests against a live database need DATABASE_URL and the
    // migrations applied:
    //
    // #[sqlx::test(migrations = "./migrations")]
    // async fn second_completed_row_hits_partial_unique_index(pool: PgPool) { ... }
}
