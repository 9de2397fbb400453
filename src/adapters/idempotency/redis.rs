//! Redis-backed idempotency store.
//!
//! One Redis key per scoped idempotency key:
//!
//! - `SET key "reserved:<token>" NX PX <lock_ttl>` claims it for an in-flight request
//! - `SET key <json record> PX <ttl>` replaces the claim with the response
//! - a compare-and-delete script releases the claim after a non-2xx response,
//!   only while it still holds the caller's token
//!
//! Expiry is left to Redis TTLs, so `purge_expired` has nothing to do.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{IdempotencyRecord, IdempotencyStore, ReservationToken};

const KEY_PREFIX: &str = "idempotency:";
const RESERVED_PREFIX: &str = "reserved:";

/// Delete `KEYS[1]` only if it still equals `ARGV[1]`.
static RELEASE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        end
        return 0
        ",
    )
});

/// Wire form of a cached response. The body is hex so arbitrary bytes survive JSON.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResponse {
    status_code: u16,
    content_type: Option<String>,
    body_hex: String,
    created_at: Timestamp,
}

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: MultiplexedConnection,
}

impl RedisIdempotencyStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    fn redis_key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    fn reservation_value(token: &ReservationToken) -> String {
        format!("{}{}", RESERVED_PREFIX, token)
    }

    fn ttl_millis(ttl: Duration) -> u64 {
        (ttl.as_millis() as u64).max(1)
    }

    fn decode(key: &str, raw: &str) -> Result<IdempotencyRecord, DomainError> {
        let stored: StoredResponse = serde_json::from_str(raw)
            .map_err(|e| DomainError::cache(format!("Corrupt idempotency record: {}", e)))?;
        let body = hex::decode(&stored.body_hex)
            .map_err(|e| DomainError::cache(format!("Corrupt idempotency body: {}", e)))?;

        Ok(IdempotencyRecord {
            key: key.to_string(),
            status_code: stored.status_code,
            content_type: stored.content_type,
            body,
            created_at: stored.created_at,
        })
    }

    fn encode(record: &IdempotencyRecord) -> Result<String, DomainError> {
        serde_json::to_string(&StoredResponse {
            status_code: record.status_code,
            content_type: record.content_type.clone(),
            body_hex: hex::encode(&record.body),
            created_at: record.created_at,
        })
        .map_err(|e| DomainError::cache(format!("Failed to encode idempotency record: {}", e)))
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, DomainError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::redis_key(key))
            .await
            .map_err(|e: redis::RedisError| DomainError::cache(e.to_string()))?;

        match raw {
            None => Ok(None),
            Some(value) if value.starts_with(RESERVED_PREFIX) => Ok(None),
            Some(value) => Self::decode(key, &value).map(Some),
        }
    }

    async fn try_reserve(
        &self,
        key: &str,
        lock_ttl: Duration,
    ) -> Result<Option<ReservationToken>, DomainError> {
        let token = ReservationToken::generate();
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::redis_key(key))
            .arg(Self::reservation_value(&token))
            .arg("NX")
            .arg("PX")
            .arg(Self::ttl_millis(lock_ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| DomainError::cache(e.to_string()))?;

        Ok(reply.map(|_| token))
    }

    async fn store(&self, record: IdempotencyRecord, ttl: Duration) -> Result<(), DomainError> {
        let value = Self::encode(&record)?;
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(Self::redis_key(&record.key), value, Self::ttl_millis(ttl))
            .await
            .map_err(|e: redis::RedisError| DomainError::cache(e.to_string()))?;
        Ok(())
    }

    async fn release(&self, key: &str, token: &ReservationToken) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let _: i64 = RELEASE
            .key(Self::redis_key(key))
            .arg(Self::reservation_value(token))
            .invoke_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| DomainError::cache(e.to_string()))?;
        Ok(())
    }

    async fn purge_expired(&self, _now: Timestamp) -> Result<u64, DomainError> {
        Ok(0)
    }
}

impl std::fmt::Debug for RedisIdempotencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisIdempotencyStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_survives_encoding() {
        let record = IdempotencyRecord {
            key: "user-1:POST:/payments/order:3f2a".to_string(),
            status_code: 201,
            content_type: Some("application/json".to_string()),
            body: vec![0, 159, 146, 150, b'{', b'}'],
            created_at: Timestamp::now(),
        };

        let encoded = RedisIdempotencyStore::encode(&record).unwrap();
        let decoded = RedisIdempotencyStore::decode(&record.key, &encoded).unwrap();

        assert_eq!(decoded, record);
    }

    #[test]
    fn corrupt_record_is_a_cache_error() {
        let err = RedisIdempotencyStore::decode("k", "{not json").unwrap_err();
        assert_eq!(err.code, crate::domain::foundation::ErrorCode::CacheError);
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(RedisIdempotencyStore::redis_key("abc"), "idempotency:abc");
    }

    #[test]
    fn reservations_never_parse_as_records() {
        let value = RedisIdempotencyStore::reservation_value(&ReservationToken::generate());
        assert!(value.starts_with(RESERVED_PREFIX));
        assert!(RedisIdempotencyStore::decode("k", &value).is_err());
    }

    #[test]
    fn sub_millisecond_ttl_is_rounded_up() {
        assert_eq!(RedisIdempotencyStore::ttl_millis(Duration::from_micros(10)), 1);
    }
}
