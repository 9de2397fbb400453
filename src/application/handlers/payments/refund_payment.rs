//! RefundPaymentHandler - Command handler for admin refunds.
//!
//! A full refund moves the ledger `completed -> refunded` once the provider
//! confirms it. A partial refund is recorded in metadata and leaves the row
//! `completed`. A refund the provider reports as pending is settled by the
//! `capture.refunded` webhook.

use std::sync::Arc;

use crate::adapters::providers::ProviderRegistry;
use crate::domain::foundation::{AuthenticatedUser, Timestamp};
use crate::domain::payment::{
    IdempotencyKey, Money, PaymentError, Transaction, TransactionStatus,
};
use crate::ports::{ProviderRefund, ProviderRefundStatus, TransactionRepository, TransitionOutcome};

use super::ledger_transition::{apply_change, LedgerChange, TransitionResult};

/// Command to refund a capture.
#[derive(Debug, Clone)]
pub struct RefundPaymentCommand {
    pub actor: AuthenticatedUser,
    pub capture_id: String,
    /// Decimal amount in the transaction's currency; full refund when `None`.
    pub amount: Option<String>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone)]
pub struct RefundPaymentResult {
    pub transaction: Transaction,
    pub refund: ProviderRefund,
}

pub struct RefundPaymentHandler {
    providers: ProviderRegistry,
    repository: Arc<dyn TransactionRepository>,
}

impl RefundPaymentHandler {
    pub fn new(providers: ProviderRegistry, repository: Arc<dyn TransactionRepository>) -> Self {
        Self {
            providers,
            repository,
        }
    }

    pub async fn handle(&self, cmd: RefundPaymentCommand) -> Result<RefundPaymentResult, PaymentError> {
        if !cmd.actor.is_admin() {
            tracing::warn!(
                target: "security",
                user_id = %cmd.actor.id,
                capture_id = %cmd.capture_id,
                "Refund attempted without admin role"
            );
            return Err(PaymentError::Forbidden("Refunds require the admin role".to_string()));
        }

        let transaction = self
            .repository
            .find_by_capture_id(None, &cmd.capture_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(cmd.capture_id.clone()))?;

        if transaction.status != TransactionStatus::Completed {
            return Err(PaymentError::InvalidTransition {
                from: transaction.status,
                to: TransactionStatus::Refunded,
            });
        }

        let amount = self.refund_amount(&transaction, cmd.amount.as_deref())?;
        let is_partial = amount.is_some();

        let provider = self.providers.get(transaction.provider)?;
        let refund = provider
            .refund(&cmd.capture_id, amount, &cmd.idempotency_key)
            .await?;

        match refund.status {
            ProviderRefundStatus::Failed => {
                return Err(PaymentError::provider_rejected(
                    transaction.provider,
                    format!("Refund {} failed", refund.id),
                ))
            }
            ProviderRefundStatus::Completed if !is_partial => {
                let change = LedgerChange::Refund {
                    refund_id: Some(refund.id.clone()),
                };
                let transaction_id = transaction.id;
                return match apply_change(self.repository.as_ref(), transaction, &change, Timestamp::now())
                    .await?
                {
                    TransitionResult::Applied(transaction)
                    | TransitionResult::AlreadyApplied(transaction) => {
                        tracing::info!(
                            transaction_id = %transaction.id,
                            refund_id = %refund.id,
                            "Payment refunded"
                        );
                        Ok(RefundPaymentResult { transaction, refund })
                    }
                    TransitionResult::Rejected { current, target } => {
                        tracing::error!(
                            transaction_id = %transaction_id,
                            refund_id = %refund.id,
                            current = %current,
                            "Provider refunded but ledger row moved; needs reconciliation"
                        );
                        Err(PaymentError::InvalidTransition {
                            from: current,
                            to: target,
                        })
                    }
                };
            }
            ProviderRefundStatus::Completed | ProviderRefundStatus::Pending => {}
        }

        // Partial or still-pending refund: note it on the completed row.
        let mut updated = transaction.clone();
        let key = if is_partial { "partial_refund_id" } else { "pending_refund_id" };
        updated.merge_metadata([(key.to_string(), refund.id.clone())]);
        if let Some(amount) = amount {
            updated.merge_metadata([("partial_refund_amount", amount.to_string())]);
        }
        updated.updated_at = Timestamp::now();

        match self
            .repository
            .update_if_status(&updated, TransactionStatus::Completed)
            .await?
        {
            TransitionOutcome::Applied => {
                tracing::info!(
                    transaction_id = %updated.id,
                    refund_id = %refund.id,
                    partial = is_partial,
                    refund_status = ?refund.status,
                    "Refund recorded"
                );
                Ok(RefundPaymentResult {
                    transaction: updated,
                    refund,
                })
            }
            TransitionOutcome::Conflict { current } => {
                let transaction = self
                    .repository
                    .find_by_id(&updated.id)
                    .await?
                    .unwrap_or(transaction);
                tracing::warn!(
                    transaction_id = %transaction.id,
                    current = %current,
                    "Ledger row moved while recording refund"
                );
                Ok(RefundPaymentResult { transaction, refund })
            }
        }
    }

    /// `None` for a full refund, `Some` for a partial one.
    fn refund_amount(
        &self,
        transaction: &Transaction,
        raw: Option<&str>,
    ) -> Result<Option<Money>, PaymentError> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let amount = Money::parse_decimal(raw, transaction.amount.currency())?;

        if amount.amount_minor() == 0 || amount.amount_minor() > transaction.amount.amount_minor() {
            return Err(PaymentError::validation(
                "amount",
                format!(
                    "Refund amount must be between 0.01 and {}",
                    transaction.amount
                ),
            ));
        }
        if amount == transaction.amount {
            return Ok(None);
        }
        Ok(Some(amount))
    }
}
