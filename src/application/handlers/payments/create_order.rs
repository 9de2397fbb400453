//! CreateOrderHandler - Command handler for opening a provider order.
//!
//! The amount is always resolved from the catalog. A client-displayed amount,
//! when sent, is only checked against it.

use std::sync::Arc;

use crate::adapters::providers::ProviderRegistry;
use crate::domain::catalog::{Catalog, ExchangeRates, PriceValidator};
use crate::domain::foundation::{ErrorCode, Timestamp, UserId};
use crate::domain::payment::{
    Currency, IdempotencyKey, Money, PaymentError, ProductRef, ProviderKind, Transaction,
};
use crate::ports::{CreateOrderRequest, TransactionRepository};

/// Command to open an order for one catalog product.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_id: UserId,
    pub product_id: String,
    pub currency: Currency,
    pub provider: ProviderKind,
    /// Amount the client showed the buyer, if it sent one.
    pub expected_amount: Option<Money>,
    pub idempotency_key: IdempotencyKey,
}

/// Result of a successfully recorded order.
#[derive(Debug, Clone)]
pub struct CreateOrderResult {
    pub transaction: Transaction,
    pub approval_link: Option<String>,
}

/// Handler for opening provider orders and recording them as `pending`.
pub struct CreateOrderHandler {
    catalog: Arc<Catalog>,
    rates: Arc<ExchangeRates>,
    providers: ProviderRegistry,
    repository: Arc<dyn TransactionRepository>,
    validator: PriceValidator,
    enforce_single_purchase: bool,
}

impl CreateOrderHandler {
    pub fn new(
        catalog: Arc<Catalog>,
        rates: Arc<ExchangeRates>,
        providers: ProviderRegistry,
        repository: Arc<dyn TransactionRepository>,
    ) -> Self {
        Self {
            catalog,
            rates,
            providers,
            repository,
            validator: PriceValidator::default(),
            enforce_single_purchase: true,
        }
    }

    pub fn with_single_purchase(mut self, enforce: bool) -> Self {
        self.enforce_single_purchase = enforce;
        self
    }

    pub fn with_price_validator(mut self, validator: PriceValidator) -> Self {
        self.validator = validator;
        self
    }

    pub async fn handle(&self, cmd: CreateOrderCommand) -> Result<CreateOrderResult, PaymentError> {
        // 1. Resolve the canonical price in the requested currency
        let entry = self.catalog.lookup(&cmd.product_id)?;
        let amount = self.rates.convert(entry.price, cmd.currency)?;

        // 2. Client-displayed amount must agree with the catalog
        if let Some(claimed) = cmd.expected_amount {
            if let Err(err) = self.validator.check(claimed, amount) {
                tracing::warn!(
                    target: "security",
                    user_id = %cmd.user_id,
                    product_id = %cmd.product_id,
                    expected = %amount,
                    claimed = %claimed,
                    "Rejected order with tampered price"
                );
                return Err(err.into());
            }
        }

        // 3. Purchase-once check, independent of the idempotency key
        if self.enforce_single_purchase
            && self
                .repository
                .has_completed_purchase(&cmd.user_id, &entry.product_id)
                .await?
        {
            tracing::info!(
                user_id = %cmd.user_id,
                product_id = %entry.product_id,
                "Rejected repeat purchase"
            );
            return Err(PaymentError::AlreadyPurchased {
                product_id: entry.product_id.to_string(),
            });
        }

        // 4. Open the order with the provider
        let provider = self.providers.get(cmd.provider)?;
        let order = provider
            .create_order(&CreateOrderRequest {
                amount,
                buyer_ref: cmd.user_id.to_string(),
                description: entry.name.clone(),
                idempotency_key: cmd.idempotency_key,
            })
            .await?;

        // 5. Record it as pending
        let mut transaction = Transaction::open(
            cmd.user_id,
            cmd.provider,
            order.id.clone(),
            amount,
            ProductRef::from(entry),
            Timestamp::now(),
        );
        transaction.merge_metadata(order.details.iter().cloned());

        if let Err(err) = self.repository.create(&transaction).await {
            tracing::error!(
                provider = %cmd.provider,
                provider_order_id = %order.id,
                error = %err,
                "Provider order opened but not recorded"
            );
            return Err(match err.code {
                ErrorCode::DuplicateProviderOrder => PaymentError::DuplicateProviderOrder {
                    provider: cmd.provider,
                    order_id: order.id,
                },
                _ => err.into(),
            });
        }

        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %transaction.user_id,
            provider = %transaction.provider,
            provider_order_id = %transaction.provider_order_id,
            amount = %transaction.amount,
            product_id = %transaction.product.product_id,
            "Payment order created"
        );

        Ok(CreateOrderResult {
            transaction,
            approval_link: order.approval_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTransactionRepository;
    use crate::adapters::providers::MockPaymentProvider;
    use crate::domain::payment::TransactionStatus;

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        handler: CreateOrderHandler,
        repo: InMemoryTransactionRepository,
        provider: Arc<MockPaymentProvider>,
    }

    fn fixture() -> Fixture {
        let repo = InMemoryTransactionRepository::new();
        let provider = Arc::new(MockPaymentProvider::new(ProviderKind::Card));
        let handler = CreateOrderHandler::new(
            Arc::new(Catalog::standard()),
            Arc::new(ExchangeRates::standard()),
            ProviderRegistry::new().with(provider.clone()),
            Arc::new(repo.clone()),
        );
        Fixture {
            handler,
            repo,
            provider,
        }
    }

    fn command(product_id: &str, currency: Currency) -> CreateOrderCommand {
        CreateOrderCommand {
            user_id: UserId::new("user-1").unwrap(),
            product_id: product_id.to_string(),
            currency,
            provider: ProviderKind::Card,
            expected_amount: None,
            idempotency_key: IdempotencyKey::generate(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn records_pending_transaction_at_catalog_price() {
        let f = fixture();

        let result = f.handler.handle(command("course-42", Currency::Eur)).await.unwrap();

        assert_eq!(result.transaction.status, TransactionStatus::Pending);
        assert_eq!(result.transaction.amount, Money::major(100, Currency::Eur));
        assert_eq!(result.transaction.provider_order_id, "card_order_1");
        assert!(result.approval_link.is_some());
        assert_eq!(f.repo.all().await.len(), 1);
    }

    #[tokio::test]
    async fn converts_price_into_display_currency() {
        let f = fixture();

        let result = f.handler.handle(command("course-42", Currency::Usd)).await.unwrap();

        assert_eq!(result.transaction.amount, Money::major(109, Currency::Usd));
    }

    #[tokio::test]
    async fn forwards_idempotency_key_to_provider() {
        let f = fixture();
        let cmd = command("course-42", Currency::Eur);
        let key = cmd.idempotency_key.to_string();

        f.handler.handle(cmd).await.unwrap();

        assert_eq!(f.provider.idempotency_keys("create_order"), vec![key]);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let f = fixture();

        let err = f.handler.handle(command("course-999", Currency::Eur)).await.unwrap_err();

        assert_eq!(err, PaymentError::ProductNotFound("course-999".into()));
        assert_eq!(f.provider.call_count("create_order"), 0);
    }

    #[tokio::test]
    async fn amount_within_tolerance_is_accepted() {
        let f = fixture();
        let mut cmd = command("course-42", Currency::Eur);
        cmd.expected_amount = Some(Money::new(10_050, Currency::Eur).unwrap());

        assert!(f.handler.handle(cmd).await.is_ok());
    }

    #[tokio::test]
    async fn tampered_amount_is_rejected_before_provider_call() {
        let f = fixture();
        let mut cmd = command("course-42", Currency::Eur);
        cmd.expected_amount = Some(Money::new(9_850, Currency::Eur).unwrap());

        let err = f.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, PaymentError::PriceMismatch { .. }));
        assert_eq!(f.provider.call_count("create_order"), 0);
        assert!(f.repo.all().await.is_empty());
    }

    #[tokio::test]
    async fn completed_purchase_blocks_new_order() {
        let f = fixture();
        let first = f.handler.handle(command("course-42", Currency::Eur)).await.unwrap();
        let mut tx = first.transaction.clone();
        tx.complete("cap_1", Timestamp::now()).unwrap();
        f.repo
            .update_if_status(&tx, TransactionStatus::Pending)
            .await
            .unwrap();

        let err = f.handler.handle(command("course-42", Currency::Eur)).await.unwrap_err();

        assert_eq!(
            err,
            PaymentError::AlreadyPurchased {
                product_id: "course-42".into()
            }
        );
        assert_eq!(f.provider.call_count("create_order"), 1);
    }

    #[tokio::test]
    async fn repeat_purchase_allowed_when_not_enforced() {
        let mut f = fixture();
        f.handler = f.handler.with_single_purchase(false);
        let first = f.handler.handle(command("course-42", Currency::Eur)).await.unwrap();
        let mut tx = first.transaction.clone();
        tx.complete("cap_1", Timestamp::now()).unwrap();
        f.repo
            .update_if_status(&tx, TransactionStatus::Pending)
            .await
            .unwrap();

        assert!(f.handler.handle(command("course-42", Currency::Eur)).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_provider_is_unknown() {
        let f = fixture();
        let mut cmd = command("course-42", Currency::Eur);
        cmd.provider = ProviderKind::PayPal;

        let err = f.handler.handle(cmd).await.unwrap_err();

        assert_eq!(err, PaymentError::UnknownProvider("paypal".into()));
    }

    #[tokio::test]
    async fn provider_failure_leaves_ledger_untouched() {
        let f = fixture();
        f.provider.fail_next(
            "create_order",
            1,
            PaymentError::provider_unavailable(ProviderKind::Card, "503"),
        );

        let err = f.handler.handle(command("course-42", Currency::Eur)).await.unwrap_err();

        assert!(matches!(err, PaymentError::ProviderUnavailable { .. }));
        assert!(f.repo.all().await.is_empty());
    }
}
