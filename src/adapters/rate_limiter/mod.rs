//! [`RateLimiter`](crate::ports::RateLimiter) backends.
//!
//! `InMemoryRateLimiter` counts per process and backs the tests.
//! `RedisRateLimiter` shares counters across replicas.

mod in_memory;
mod redis;

pub use in_memory::InMemoryRateLimiter;
pub use redis::RedisRateLimiter;

use crate::ports::{RateLimitDenied, RateLimitKey};

/// Never tell a client to retry in zero seconds.
fn denied(key: &RateLimitKey, limit: u32, retry_after: u32) -> RateLimitDenied {
    RateLimitDenied {
        limit,
        retry_after_secs: retry_after.max(1),
        scope: key.scope,
    }
}
