//! Idempotency store port.
//!
//! Backs the Idempotency Guard. Must be shared by every serving process:
//! an in-process map only holds the at-most-once guarantee on a single node.
//!
//! ## Protocol
//!
//! ```text
//! get(key) ── hit ──► replay cached response
//!    │
//!   miss
//!    ▼
//! try_reserve(key) ── lost ──► 409 (another request in flight)
//!    │
//!   won (token)
//!    ▼
//! run handler ── 2xx ──► store(record)          (replaces the reservation)
//!             └─ else ─► release(key, token)    (key can be retried)
//! ```
//!
//! `release` only drops the reservation that `token` names. A claim that
//! lapsed and was taken by another request stays in place.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, Timestamp};

/// A cached successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    /// Scoped key (fingerprint + client key).
    pub key: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub created_at: Timestamp,
}

/// Identifies one reservation of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReservationToken(String);

impl ReservationToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port for idempotency record storage.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Returns the completed record for `key`, ignoring in-flight reservations.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, DomainError>;

    /// Atomically claims `key` for `lock_ttl`. Returns `None` when the key is
    /// already reserved or completed.
    async fn try_reserve(
        &self,
        key: &str,
        lock_ttl: Duration,
    ) -> Result<Option<ReservationToken>, DomainError>;

    /// Stores the completed response for `ttl`, replacing the reservation.
    async fn store(&self, record: IdempotencyRecord, ttl: Duration) -> Result<(), DomainError>;

    /// Drops the reservation named by `token` so the key can be retried.
    async fn release(&self, key: &str, token: &ReservationToken) -> Result<(), DomainError>;

    /// Evicts expired entries; returns how many were removed.
    ///
    /// Stores with native TTL support may return 0.
    async fn purge_expired(&self, now: Timestamp) -> Result<u64, DomainError>;
}
