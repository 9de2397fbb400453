//! GetLedgerStatsHandler - Query handler for admin ledger figures.

use std::sync::Arc;

use crate::domain::foundation::AuthenticatedUser;
use crate::domain::payment::PaymentError;
use crate::ports::{LedgerStats, TransactionRepository};

#[derive(Debug, Clone)]
pub struct GetLedgerStatsQuery {
    pub actor: AuthenticatedUser,
}

pub type GetLedgerStatsResult = LedgerStats;

pub struct GetLedgerStatsHandler {
    repository: Arc<dyn TransactionRepository>,
}

impl GetLedgerStatsHandler {
    pub fn new(repository: Arc<dyn TransactionRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(&self, query: GetLedgerStatsQuery) -> Result<GetLedgerStatsResult, PaymentError> {
        if !query.actor.is_admin() {
            return Err(PaymentError::Forbidden(
                "Ledger statistics require the admin role".to_string(),
            ));
        }
        Ok(self.repository.stats().await?)
    }
}
