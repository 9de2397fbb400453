//! Fixed-window request limits.
//!
//! A counter is identified by a bucket (endpoint family), a scope and the
//! subject within that scope. Rules travel with each call so one backend
//! serves the payment and webhook policies alike.

use std::fmt;

use async_trait::async_trait;

use crate::domain::foundation::{Timestamp, UserId};

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one hit on `key` and report whether it fits under `rule`.
    async fn check(
        &self,
        key: &RateLimitKey,
        rule: &RateLimitRule,
    ) -> Result<RateLimitResult, RateLimitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: u32,
}

impl RateLimitRule {
    /// Order, capture and refund commands, per user.
    pub const PAYMENT: Self = Self::per_window(10, 15 * 60);

    /// Provider callbacks, per source IP.
    pub const WEBHOOK: Self = Self::per_window(100, 60);

    pub const fn per_window(limit: u32, window_secs: u32) -> Self {
        Self { limit, window_secs }
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimitScope {
    Ip,
    User,
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ip => "ip",
            Self::User => "user",
        })
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    /// `payment` or `webhook`
    pub bucket: &'static str,
    pub scope: RateLimitScope,
    pub identifier: String,
}

impl RateLimitKey {
    pub fn user(bucket: &'static str, user_id: &UserId) -> Self {
        Self {
            bucket,
            scope: RateLimitScope::User,
            identifier: user_id.to_string(),
        }
    }

    pub fn ip(bucket: &'static str, ip: &str) -> Self {
        Self {
            bucket,
            scope: RateLimitScope::Ip,
            identifier: ip.to_owned(),
        }
    }

    /// `ratelimit:{bucket}:{scope}:{identifier}`
    pub fn storage_key(&self) -> String {
        format!("ratelimit:{}:{}:{}", self.bucket, self.scope, self.identifier)
    }
}

#[derive(Debug, Clone)]
pub enum RateLimitResult {
    Allowed(RateLimitStatus),
    Denied(RateLimitDenied),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Quota left after an allowed hit.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct RateLimitDenied {
    pub limit: u32,
    /// At least 1
    pub retry_after_secs: u32,
    pub scope: RateLimitScope,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_separate_buckets_and_scopes() {
        let user = RateLimitKey::user("payment", &UserId::new("user-123").unwrap());
        let ip = RateLimitKey::ip("webhook", "10.0.0.1");

        assert_eq!(user.storage_key(), "ratelimit:payment:user:user-123");
        assert_eq!(ip.storage_key(), "ratelimit:webhook:ip:10.0.0.1");
        assert_ne!(
            RateLimitKey::ip("payment", "10.0.0.1").storage_key(),
            ip.storage_key()
        );
    }

    #[test]
    fn payment_commands_get_ten_per_quarter_hour() {
        assert_eq!(RateLimitRule::PAYMENT, RateLimitRule::per_window(10, 900));
        assert_eq!(RateLimitRule::WEBHOOK, RateLimitRule::per_window(100, 60));
    }
}
