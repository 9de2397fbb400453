//! In-memory rate limiter implementation for testing and development.
//!
//! Uses a fixed-window counter algorithm with an in-memory HashMap.
//! Not suitable for production multi-server deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    RateLimitError, RateLimitKey, RateLimitResult, RateLimitRule, RateLimitStatus, RateLimiter,
};

use super::denied;

/// In-memory rate limiter for testing and single-server deployments.
///
/// Each window tracks the count of requests and resets when it expires.
#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    /// Per-key window state.
    windows: Arc<RwLock<HashMap<String, WindowState>>>,
}

/// State for a single rate limit window.
#[derive(Debug, Clone)]
struct WindowState {
    /// Number of requests in the current window.
    count: u32,
    /// When the current window started.
    window_start: i64,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request at an explicit clock reading (unix seconds).
    async fn check_at(&self, key: &RateLimitKey, rule: &RateLimitRule, now: i64) -> RateLimitResult {
        let window_secs = rule.window_secs as i64;
        let mut windows = self.windows.write().await;

        let state = windows
            .entry(key.storage_key())
            .or_insert_with(|| WindowState {
                count: 0,
                window_start: now,
            });

        if now >= state.window_start + window_secs {
            state.count = 0;
            state.window_start = now;
        }

        let window_end = state.window_start + window_secs;

        if state.count >= rule.limit {
            let retry_after = (window_end - now).max(0) as u32;
            return RateLimitResult::Denied(denied(key, rule.limit, retry_after));
        }

        state.count += 1;

        RateLimitResult::Allowed(RateLimitStatus {
            limit: rule.limit,
            remaining: rule.limit.saturating_sub(state.count),
            reset_at: Timestamp::from_unix_secs(window_end).unwrap_or_else(Timestamp::now),
        })
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(
        &self,
        key: &RateLimitKey,
        rule: &RateLimitRule,
    ) -> Result<RateLimitResult, RateLimitError> {
        Ok(self.check_at(key, rule, Timestamp::now().as_unix_secs()).await)
    }
}
