//! PostgreSQL implementation of WebhookEventRepository.
//!
//! `(provider, event_id)` is the primary key; `save` relies on
//! `ON CONFLICT DO NOTHING` so concurrent redeliveries cannot both insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, Timestamp, TransactionId};
use crate::domain::payment::ProviderKind;
use crate::ports::{SaveResult, WebhookEventOutcome, WebhookEventRecord, WebhookEventRepository};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    provider: String,
    event_id: String,
    event_type: String,
    processed_at: DateTime<Utc>,
    outcome: String,
    detail: Option<String>,
    transaction_id: Option<Uuid>,
    payload: serde_json::Value,
}

fn parse_outcome(s: &str) -> Result<WebhookEventOutcome, DomainError> {
    match s {
        "applied" => Ok(WebhookEventOutcome::Applied),
        "ignored" => Ok(WebhookEventOutcome::Ignored),
        "rejected" => Ok(WebhookEventOutcome::Rejected),
        other => Err(DomainError::database(format!(
            "Invalid webhook outcome value: {}",
            other
        ))),
    }
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEventRecord {
            provider: row
                .provider
                .parse()
                .map_err(|e| DomainError::database(format!("Invalid provider value: {}", e)))?,
            event_id: row.event_id,
            event_type: row.event_type,
            processed_at: Timestamp::from_datetime(row.processed_at),
            outcome: parse_outcome(&row.outcome)?,
            detail: row.detail,
            transaction_id: row.transaction_id.map(TransactionId::from_uuid),
            payload: row.payload,
        })
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find(
        &self,
        provider: ProviderKind,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT provider, event_id, event_type, processed_at, outcome, detail,
                   transaction_id, payload
            FROM payment_webhook_events
            WHERE provider = $1 AND event_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to fetch webhook event: {}", e)))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_webhook_events (
                provider, event_id, event_type, processed_at, outcome, detail,
                transaction_id, payload
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(record.provider.as_str())
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(record.processed_at.as_datetime())
        .bind(record.outcome.as_str())
        .bind(&record.detail)
        .bind(record.transaction_id.map(|id| *id.as_uuid()))
        .bind(&record.payload)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save webhook event: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM payment_webhook_events WHERE processed_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::database(format!("Failed to purge webhook events: {}", e))
            })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_strings_parse_back() {
        for outcome in [
            WebhookEventOutcome::Applied,
            WebhookEventOutcome::Ignored,
            WebhookEventOutcome::Rejected,
        ] {
            assert_eq!(parse_outcome(outcome.as_str()).unwrap(), outcome);
        }
        assert!(parse_outcome("processed").is_err());
    }

    #[test]
    fn row_converts_to_record() {
        let tx = Uuid::new_v4();
        let row = WebhookEventRow {
            provider: "card".to_string(),
            event_id: "evt_1".to_string(),
            event_type: "payment_intent.succeeded".to_string(),
            processed_at: Utc::now(),
            outcome: "applied".to_string(),
            detail: None,
            transaction_id: Some(tx),
            payload: serde_json::json!({"id": "evt_1"}),
        };

        let record = WebhookEventRecord::try_from(row).unwrap();
        assert_eq!(record.provider, ProviderKind::Card);
        assert_eq!(record.transaction_id, Some(TransactionId::from_uuid(tx)));
    }
}
