//! CaptureOrderHandler - Command handler for capturing an approved order.

use std::sync::Arc;

use crate::adapters::providers::ProviderRegistry;
use crate::domain::catalog::PriceValidator;
use crate::domain::foundation::{AuthenticatedUser, Timestamp};
use crate::domain::payment::{
    IdempotencyKey, PaymentError, ProviderKind, Transaction, TransactionStatus,
};
use crate::ports::{ProviderOrderStatus, TransactionRepository};

use super::ledger_transition::{apply_change, LedgerChange, TransitionResult};

/// Command to capture the order a buyer approved.
#[derive(Debug, Clone)]
pub struct CaptureOrderCommand {
    pub actor: AuthenticatedUser,
    pub provider_order_id: String,
    pub idempotency_key: IdempotencyKey,
}

/// Ledger state after the capture attempt.
#[derive(Debug, Clone)]
pub struct CaptureOrderResult {
    pub transaction: Transaction,
}

/// Handler for buyer-initiated captures.
///
/// Only the owner may capture. A transaction that is already `completed`
/// is returned as-is without calling the provider again.
pub struct CaptureOrderHandler {
    providers: ProviderRegistry,
    repository: Arc<dyn TransactionRepository>,
    validator: PriceValidator,
}

impl CaptureOrderHandler {
    pub fn new(providers: ProviderRegistry, repository: Arc<dyn TransactionRepository>) -> Self {
        Self {
            providers,
            repository,
            validator: PriceValidator::default(),
        }
    }

    pub fn with_price_validator(mut self, validator: PriceValidator) -> Self {
        self.validator = validator;
        self
    }

    pub async fn handle(&self, cmd: CaptureOrderCommand) -> Result<CaptureOrderResult, PaymentError> {
        // 1. Find the transaction the order belongs to
        let transaction = self.find_by_order(&cmd.provider_order_id).await?;

        if transaction.user_id != cmd.actor.id && !cmd.actor.is_admin() {
            tracing::warn!(
                target: "security",
                user_id = %cmd.actor.id,
                transaction_id = %transaction.id,
                "Capture attempted on another user's order"
            );
            return Err(PaymentError::Forbidden(
                "Transaction belongs to another user".to_string(),
            ));
        }

        // 2. Only pending orders are captured
        match transaction.status {
            TransactionStatus::Pending => {}
            TransactionStatus::Completed => return Ok(CaptureOrderResult { transaction }),
            from => {
                return Err(PaymentError::InvalidTransition {
                    from,
                    to: TransactionStatus::Completed,
                })
            }
        }

        // 3. Capture with the provider
        let provider = self.providers.get(transaction.provider)?;
        let capture = provider
            .capture_order(&transaction.provider_order_id, &cmd.idempotency_key)
            .await?;

        // 4. Record the outcome
        let change = match capture.status {
            ProviderOrderStatus::Completed => {
                if !self.validator.validate_amount(capture.amount, transaction.amount) {
                    tracing::warn!(
                        target: "security",
                        transaction_id = %transaction.id,
                        expected = %transaction.amount,
                        captured = %capture.amount,
                        "Captured amount does not match ledger; left pending for review"
                    );
                    return Err(PaymentError::PriceMismatch {
                        expected: transaction.amount,
                        claimed: capture.amount,
                    });
                }
                LedgerChange::Complete {
                    capture_id: capture.capture_id.clone(),
                }
            }
            ProviderOrderStatus::Failed => LedgerChange::Fail {
                reason: format!("Capture {} declined by provider", capture.capture_id),
            },
            ProviderOrderStatus::Created
            | ProviderOrderStatus::Approved
            | ProviderOrderStatus::Processing => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    capture_status = ?capture.status,
                    "Capture in progress; awaiting provider webhook"
                );
                return Ok(CaptureOrderResult { transaction });
            }
        };

        let transaction_id = transaction.id;
        match apply_change(self.repository.as_ref(), transaction, &change, Timestamp::now()).await? {
            TransitionResult::Applied(transaction) | TransitionResult::AlreadyApplied(transaction) => {
                tracing::info!(
                    transaction_id = %transaction.id,
                    status = %transaction.status,
                    capture_id = ?transaction.capture_id,
                    "Capture recorded"
                );
                Ok(CaptureOrderResult { transaction })
            }
            TransitionResult::Rejected { current, target } => {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    current = %current,
                    "Capture lost race with another transition"
                );
                Err(PaymentError::InvalidTransition {
                    from: current,
                    to: target,
                })
            }
        }
    }

    async fn find_by_order(&self, provider_order_id: &str) -> Result<Transaction, PaymentError> {
        for kind in ProviderKind::ALL {
            if let Some(tx) = self
                .repository
                .find_by_provider_order(kind, provider_order_id)
                .await?
            {
                return Ok(tx);
            }
        }
        Err(PaymentError::TransactionNotFound(provider_order_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTransactionRepository;
    use crate::adapters::providers::MockPaymentProvider;
    use crate::domain::catalog::Catalog;
    use crate::domain::foundation::{Role, UserId};
    use crate::domain::payment::{Currency, Money, ProductRef};
    use crate::ports::{CreateOrderRequest, PaymentProvider};

    struct Fixture {
        handler: CaptureOrderHandler,
        repo: InMemoryTransactionRepository,
        provider: Arc<MockPaymentProvider>,
    }

    fn fixture() -> Fixture {
        let repo = InMemoryTransactionRepository::new();
        let provider = Arc::new(MockPaymentProvider::new(ProviderKind::Card));
        let handler = CaptureOrderHandler::new(
            ProviderRegistry::new().with(provider.clone()),
            Arc::new(repo.clone()),
        );
        Fixture {
            handler,
            repo,
            provider,
        }
    }

    fn owner() -> AuthenticatedUser {
        AuthenticatedUser::customer(UserId::new("user-1").unwrap())
    }

    /// Opens an order at the mock and records it pending for `user-1`.
    async fn open_order(f: &Fixture) -> Transaction {
        let amount = Money::major(100, Currency::Eur);
        let order = f
            .provider
            .create_order(&CreateOrderRequest {
                amount,
                buyer_ref: "user-1".into(),
                description: "Course 42".into(),
                idempotency_key: IdempotencyKey::generate(),
            })
            .await
            .unwrap();
        let tx = Transaction::open(
            UserId::new("user-1").unwrap(),
            ProviderKind::Card,
            order.id,
            amount,
            ProductRef::from(Catalog::standard().lookup("course-42").unwrap()),
            Timestamp::now(),
        );
        f.repo.create(&tx).await.unwrap();
        tx
    }

    fn command(actor: AuthenticatedUser, order_id: &str) -> CaptureOrderCommand {
        CaptureOrderCommand {
            actor,
            provider_order_id: order_id.to_string(),
            idempotency_key: IdempotencyKey::generate(),
        }
    }

    #[tokio::test]
    async fn capture_completes_transaction() {
        let f = fixture();
        let tx = open_order(&f).await;

        let result = f
            .handler
            .handle(command(owner(), &tx.provider_order_id))
            .await
            .unwrap();

        assert_eq!(result.transaction.status, TransactionStatus::Completed);
        assert_eq!(result.transaction.capture_id.as_deref(), Some("cap_card_order_1"));
        assert!(result.transaction.paid_at.is_some());
    }

    #[tokio::test]
    async fn completed_transaction_is_not_captured_twice() {
        let f = fixture();
        let tx = open_order(&f).await;
        f.handler
            .handle(command(owner(), &tx.provider_order_id))
            .await
            .unwrap();

        let again = f
            .handler
            .handle(command(owner(), &tx.provider_order_id))
            .await
            .unwrap();

        assert_eq!(again.transaction.status, TransactionStatus::Completed);
        assert_eq!(f.provider.call_count("capture_order"), 1);
    }

    #[tokio::test]
    async fn other_user_is_forbidden() {
        let f = fixture();
        let tx = open_order(&f).await;
        let stranger = AuthenticatedUser::customer(UserId::new("user-2").unwrap());

        let err = f
            .handler
            .handle(command(stranger, &tx.provider_order_id))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Forbidden(_)));
        assert_eq!(f.provider.call_count("capture_order"), 0);
    }

    #[tokio::test]
    async fn admin_may_capture_for_user() {
        let f = fixture();
        let tx = open_order(&f).await;
        let admin = AuthenticatedUser::new(UserId::new("ops").unwrap(), None, Role::Admin);

        let result = f
            .handler
            .handle(command(admin, &tx.provider_order_id))
            .await
            .unwrap();

        assert_eq!(result.transaction.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let f = fixture();

        let err = f
            .handler
            .handle(command(owner(), "card_order_404"))
            .await
            .unwrap_err();

        assert_eq!(err, PaymentError::TransactionNotFound("card_order_404".into()));
    }

    #[tokio::test]
    async fn failed_transaction_cannot_be_captured() {
        let f = fixture();
        let mut tx = open_order(&f).await;
        tx.fail("expired", Timestamp::now()).unwrap();
        f.repo
            .update_if_status(&tx, TransactionStatus::Pending)
            .await
            .unwrap();

        let err = f
            .handler
            .handle(command(owner(), &tx.provider_order_id))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PaymentError::InvalidTransition {
                from: TransactionStatus::Failed,
                to: TransactionStatus::Completed,
            }
        );
    }

    #[tokio::test]
    async fn short_capture_leaves_transaction_pending() {
        let f = fixture();
        let tx = open_order(&f).await;
        f.provider.set_capture_amount(Money::major(50, Currency::Eur));

        let err = f
            .handler
            .handle(command(owner(), &tx.provider_order_id))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::PriceMismatch { .. }));
        let stored = f.repo.find_by_id(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }
}
