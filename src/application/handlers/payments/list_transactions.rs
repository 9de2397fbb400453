//! ListTransactionsHandler - Query handler for a user's recent purchases.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::payment::Transaction;
use crate::ports::TransactionRepository;

/// Most recent transactions returned when the caller does not ask for fewer.
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct ListTransactionsQuery {
    pub user_id: UserId,
    pub limit: Option<u32>,
}

pub type ListTransactionsResult = Vec<Transaction>;

pub struct ListTransactionsHandler {
    repository: Arc<dyn TransactionRepository>,
}

impl ListTransactionsHandler {
    pub fn new(repository: Arc<dyn TransactionRepository>) -> Self {
        Self { repository }
    }

    /// Newest first, capped at `DEFAULT_TRANSACTION_LIMIT`.
    pub async fn handle(&self, query: ListTransactionsQuery) -> Result<ListTransactionsResult, DomainError> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
            .clamp(1, DEFAULT_TRANSACTION_LIMIT);
        self.repository.list_for_user(&query.user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTransactionRepository;
    use crate::domain::catalog::Catalog;
    use crate::domain::foundation::Timestamp;
    use crate::domain::payment::{Currency, Money, ProductRef, ProviderKind};

    async fn seeded(count: usize) -> InMemoryTransactionRepository {
        let repo = InMemoryTransactionRepository::new();
        let now = Timestamp::now();
        for i in 0..count {
            let tx = Transaction::open(
                UserId::new("user-1").unwrap(),
                ProviderKind::Card,
                format!("card_order_{}", i),
                Money::major(100, Currency::Eur),
                ProductRef::from(Catalog::standard().lookup("course-42").unwrap()),
                now.minus_minutes(i as i64),
            );
            repo.create(&tx).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn returns_at_most_ten_newest_first() {
        let repo = seeded(12).await;
        let handler = ListTransactionsHandler::new(Arc::new(repo));

        let result = handler
            .handle(ListTransactionsQuery {
                user_id: UserId::new("user-1").unwrap(),
                limit: Some(50),
            })
            .await
            .unwrap();

        assert_eq!(result.len(), 10);
        assert_eq!(result[0].provider_order_id, "card_order_0");
    }

    #[tokio::test]
    async fn other_users_see_nothing() {
        let repo = seeded(2).await;
        let handler = ListTransactionsHandler::new(Arc::new(repo));

        let result = handler
            .handle(ListTransactionsQuery {
                user_id: UserId::new("user-2").unwrap(),
                limit: None,
            })
            .await
            .unwrap();

        assert!(result.is_empty());
    }
}
