//! Idempotency store adapters.
//!
//! - `RedisIdempotencyStore` - shared store for production (SET NX + TTL)
//! - `InMemoryIdempotencyStore` - tests and single-node development

mod in_memory;
mod redis;

pub use in_memory::InMemoryIdempotencyStore;
pub use redis::RedisIdempotencyStore;
