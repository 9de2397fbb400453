//! WebhookEventRepository port - log of processed provider webhooks.
//!
//! Providers redeliver on timeouts and 5xx responses, and sometimes for no
//! reason at all. The log is keyed by `(provider, event_id)`; the first
//! writer wins and later deliveries of the same event are acknowledged
//! without touching the ledger again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, Timestamp, TransactionId};
use crate::domain::payment::{ProviderEvent, ProviderKind};

/// What processing a webhook event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventOutcome {
    /// A ledger transition was applied (or found already applied).
    Applied,
    /// Recognized but nothing to do (unrecognized kind, approval notice).
    Ignored,
    /// Could not be applied (unknown order, invalid transition).
    Rejected,
}

impl WebhookEventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventOutcome::Applied => "applied",
            WebhookEventOutcome::Ignored => "ignored",
            WebhookEventOutcome::Rejected => "rejected",
        }
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventRecord {
    pub provider: ProviderKind,
    pub event_id: String,
    pub event_type: String,
    pub processed_at: Timestamp,
    pub outcome: WebhookEventOutcome,

    /// Reason for `Ignored`/`Rejected` outcomes.
    pub detail: Option<String>,

    pub transaction_id: Option<TransactionId>,

    /// Original event payload for auditing.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    fn from_event(
        event: &ProviderEvent,
        outcome: WebhookEventOutcome,
        detail: Option<String>,
        transaction_id: Option<TransactionId>,
        processed_at: Timestamp,
    ) -> Self {
        Self {
            provider: event.provider,
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            processed_at,
            outcome,
            detail,
            transaction_id,
            payload: event.payload.clone(),
        }
    }

    pub fn applied(event: &ProviderEvent, transaction_id: TransactionId, at: Timestamp) -> Self {
        Self::from_event(event, WebhookEventOutcome::Applied, None, Some(transaction_id), at)
    }

    pub fn ignored(event: &ProviderEvent, reason: impl Into<String>, at: Timestamp) -> Self {
        Self::from_event(event, WebhookEventOutcome::Ignored, Some(reason.into()), None, at)
    }

    pub fn rejected(
        event: &ProviderEvent,
        transaction_id: Option<TransactionId>,
        reason: impl Into<String>,
        at: Timestamp,
    ) -> Self {
        Self::from_event(
            event,
            WebhookEventOutcome::Rejected,
            Some(reason.into()),
            transaction_id,
            at,
        )
    }
}

/// Result of attempting to save a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this event).
    Inserted,
    /// Record already exists (duplicate event).
    AlreadyExists,
}

/// Port for storing and retrieving processed webhook events.
///
/// Implementations must enforce uniqueness on `(provider, event_id)` in
/// storage so concurrent deliveries cannot both insert.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find(
        &self,
        provider: ProviderKind,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Insert with `ON CONFLICT DO NOTHING` semantics.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Delete records processed before `cutoff`; returns the count removed.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
