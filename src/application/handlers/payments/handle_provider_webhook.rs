//! HandleProviderWebhookHandler - Command handler for verified provider callbacks.
//!
//! Signature verification happens before anything touches storage. Verified
//! events are deduplicated per `(provider, event_id)`, applied through the
//! shared compare-and-set path, and recorded in the webhook event log.
//! Anything that is not a storage failure is acknowledged so the provider
//! stops redelivering.

use std::sync::Arc;

use http::HeaderMap;

use crate::adapters::providers::ProviderRegistry;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, TransactionId};
use crate::domain::payment::{PaymentError, ProviderEvent, ProviderKind, Transaction, WebhookError};
use crate::ports::{SaveResult, TransactionRepository, WebhookEventRecord, WebhookEventRepository};

use super::ledger_transition::{apply_change, LedgerChange, TransitionResult};

/// Raw webhook request as received.
#[derive(Debug, Clone)]
pub struct HandleProviderWebhookCommand {
    pub provider: ProviderKind,
    pub headers: HeaderMap,
    /// Exact request bytes; signatures are computed over these.
    pub body: Vec<u8>,
}

/// What the webhook did. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleProviderWebhookResult {
    /// The event moved a transaction.
    Applied { transaction: Transaction },
    /// The transaction was already in the event's target status.
    AlreadyApplied { transaction: Transaction },
    /// This event id was processed before.
    Duplicate,
    /// Recognized but carries no ledger change (approval, unknown type).
    Ignored { reason: String },
    /// Could not be applied (unknown order, forbidden transition).
    Rejected { reason: String },
}

impl HandleProviderWebhookResult {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, HandleProviderWebhookResult::Duplicate)
    }
}

pub struct HandleProviderWebhookHandler {
    providers: ProviderRegistry,
    repository: Arc<dyn TransactionRepository>,
    events: Arc<dyn WebhookEventRepository>,
}

impl HandleProviderWebhookHandler {
    pub fn new(
        providers: ProviderRegistry,
        repository: Arc<dyn TransactionRepository>,
        events: Arc<dyn WebhookEventRepository>,
    ) -> Self {
        Self {
            providers,
            repository,
            events,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleProviderWebhookCommand,
    ) -> Result<HandleProviderWebhookResult, WebhookError> {
        // 1. Verify signature over the raw bytes
        let provider = self.providers.get(cmd.provider)?;
        let event = match provider.verify_webhook(&cmd.headers, &cmd.body).await {
            Ok(event) => event,
            Err(err) => {
                if let PaymentError::InvalidSignature { reason, .. } = &err {
                    tracing::warn!(
                        target: "security",
                        provider = %cmd.provider,
                        reason = %reason,
                        body_len = cmd.body.len(),
                        "Rejected webhook with invalid signature"
                    );
                }
                return Err(err.into());
            }
        };

        // 2. Deduplicate redeliveries
        if self
            .events
            .find(event.provider, &event.event_id)
            .await
            .map_err(storage)?
            .is_some()
        {
            tracing::info!(
                provider = %event.provider,
                event_id = %event.event_id,
                "Duplicate webhook event acknowledged"
            );
            return Ok(HandleProviderWebhookResult::Duplicate);
        }

        // 3. Apply and record
        let now = Timestamp::now();
        let (record, result) = self.apply(&event, now).await?;

        match self.events.save(record).await.map_err(storage)? {
            SaveResult::Inserted => Ok(result),
            SaveResult::AlreadyExists => Ok(HandleProviderWebhookResult::Duplicate),
        }
    }

    async fn apply(
        &self,
        event: &ProviderEvent,
        now: Timestamp,
    ) -> Result<(WebhookEventRecord, HandleProviderWebhookResult), WebhookError> {
        let Some(change) = LedgerChange::from_event(&event.kind) else {
            tracing::info!(
                provider = %event.provider,
                event_id = %event.event_id,
                event_type = %event.event_type,
                "Webhook event carries no ledger change"
            );
            let reason = format!("No ledger change for {}", event.event_type);
            return Ok((
                WebhookEventRecord::ignored(event, reason.clone(), now),
                HandleProviderWebhookResult::Ignored { reason },
            ));
        };

        let Some(transaction) = self.find_transaction(event).await? else {
            tracing::warn!(
                provider = %event.provider,
                event_id = %event.event_id,
                provider_order_id = ?event.provider_order_id,
                capture_id = ?event.capture_id,
                "Webhook references unknown order"
            );
            return Ok(rejected(event, None, "Unknown provider order", now));
        };

        let transaction_id = transaction.id;
        match apply_change(self.repository.as_ref(), transaction, &change, now).await {
            Ok(TransitionResult::Applied(transaction)) => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    provider = %event.provider,
                    event_id = %event.event_id,
                    status = %transaction.status,
                    "Webhook applied"
                );
                Ok((
                    WebhookEventRecord::applied(event, transaction.id, now),
                    HandleProviderWebhookResult::Applied { transaction },
                ))
            }
            Ok(TransitionResult::AlreadyApplied(transaction)) => Ok((
                WebhookEventRecord::applied(event, transaction.id, now),
                HandleProviderWebhookResult::AlreadyApplied { transaction },
            )),
            Ok(TransitionResult::Rejected { current, target }) => {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    event_id = %event.event_id,
                    current = %current,
                    target = %target,
                    "Webhook transition rejected"
                );
                Ok(rejected(
                    event,
                    Some(transaction_id),
                    format!("Cannot transition from {} to {}", current, target),
                    now,
                ))
            }
            Err(err) if err.code == ErrorCode::AlreadyPurchased => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    event_id = %event.event_id,
                    "Second completed payment for an owned product; needs refund"
                );
                Ok(rejected(
                    event,
                    Some(transaction_id),
                    "Product already purchased",
                    now,
                ))
            }
            Err(err) => Err(storage(err)),
        }
    }

    /// Order id first; refund events often only carry the capture id.
    async fn find_transaction(&self, event: &ProviderEvent) -> Result<Option<Transaction>, WebhookError> {
        if let Some(order_id) = &event.provider_order_id {
            if let Some(tx) = self
                .repository
                .find_by_provider_order(event.provider, order_id)
                .await
                .map_err(storage)?
            {
                return Ok(Some(tx));
            }
        }
        match &event.capture_id {
            Some(capture_id) => self
                .repository
                .find_by_capture_id(Some(event.provider), capture_id)
                .await
                .map_err(storage),
            None => Ok(None),
        }
    }
}

fn rejected(
    event: &ProviderEvent,
    transaction_id: Option<TransactionId>,
    reason: impl Into<String>,
    now: Timestamp,
) -> (WebhookEventRecord, HandleProviderWebhookResult) {
    let reason = reason.into();
    (
        WebhookEventRecord::rejected(event, transaction_id, reason.clone(), now),
        HandleProviderWebhookResult::Rejected { reason },
    )
}

fn storage(err: DomainError) -> WebhookError {
    tracing::error!(error = %err, "Webhook storage failure");
    WebhookError::Storage(err.message)
}
