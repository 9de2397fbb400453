//! Redis fixed-window limiter shared by every replica.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use redis::Script;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    RateLimitError, RateLimitKey, RateLimitResult, RateLimitRule, RateLimitStatus, RateLimiter,
};

use super::denied;

/// Increment and arm the expiry atomically. Returns `{count, ttl}`.
///
/// A counter must never exist without an expiry.
static HIT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        local count = redis.call('INCR', KEYS[1])
        if count == 1 then
            redis.call('EXPIRE', KEYS[1], ARGV[1])
        end
        return { count, redis.call('TTL', KEYS[1]) }
        ",
    )
});

#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
}

impl RedisRateLimiter {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        key: &RateLimitKey,
        rule: &RateLimitRule,
    ) -> Result<RateLimitResult, RateLimitError> {
        let mut conn = self.conn.clone();
        let (count, ttl): (i64, i64) = HIT
            .key(key.storage_key())
            .arg(rule.window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;

        // TTL is -1 only if someone stripped the expiry by hand.
        let secs_left = if ttl > 0 { ttl } else { i64::from(rule.window_secs) };

        if count > i64::from(rule.limit) {
            return Ok(RateLimitResult::Denied(denied(
                key,
                rule.limit,
                secs_left as u32,
            )));
        }

        let reset_at = Timestamp::from_unix_secs(Timestamp::now().as_unix_secs() + secs_left)
            .unwrap_or_else(Timestamp::now);
        Ok(RateLimitResult::Allowed(RateLimitStatus {
            limit: rule.limit,
            remaining: rule.limit.saturating_sub(count as u32),
            reset_at,
        }))
    }
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter").finish_non_exhaustive()
    }
}
