//! In-memory idempotency store for testing and single-node development.
//!
//! Only holds the at-most-once guarantee inside one process. Production
//! deployments use `RedisIdempotencyStore`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{IdempotencyRecord, IdempotencyStore, ReservationToken};

#[derive(Debug, Clone)]
enum Slot {
    Reserved(ReservationToken),
    Completed(IdempotencyRecord),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Timestamp,
}

impl Entry {
    fn is_live(&self, now: &Timestamp) -> bool {
        self.expires_at.is_after(now)
    }
}

fn expiry(now: Timestamp, ttl: Duration) -> Timestamp {
    now.plus_secs(ttl.as_secs().max(1))
}

/// In-memory idempotency store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, live or expired (for test assertions).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, DomainError> {
        let now = Timestamp::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(&now))
            .and_then(|e| match &e.slot {
                Slot::Completed(record) => Some(record.clone()),
                Slot::Reserved(_) => None,
            }))
    }

    async fn try_reserve(
        &self,
        key: &str,
        lock_ttl: Duration,
    ) -> Result<Option<ReservationToken>, DomainError> {
        let now = Timestamp::now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|e| e.is_live(&now)) {
            return Ok(None);
        }

        let token = ReservationToken::generate();
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Reserved(token.clone()),
                expires_at: expiry(now, lock_ttl),
            },
        );
        Ok(Some(token))
    }

    async fn store(&self, record: IdempotencyRecord, ttl: Duration) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            record.key.clone(),
            Entry {
                expires_at: expiry(Timestamp::now(), ttl),
                slot: Slot::Completed(record),
            },
        );
        Ok(())
    }

    async fn release(&self, key: &str, token: &ReservationToken) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        if matches!(entries.get(key).map(|e| &e.slot), Some(Slot::Reserved(held)) if held == token) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, DomainError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(&now));
        Ok((before - entries.len()) as u64)
    }
}
