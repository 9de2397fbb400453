//! Rate limiting middleware for axum.
//!
//! This module provides middleware that enforces rate limits using the `RateLimiter` port.
//!
//! # Architecture
//!
//! Each route group carries its own `RateLimitPolicy`:
//! - payment commands are limited per authenticated user (falling back to
//!   client IP when the caller is anonymous), 10 requests per 15 minutes
//! - provider webhooks are limited per client IP, 100 requests per minute
//!
//! Rate limit status is returned in standard HTTP headers:
//! - `X-RateLimit-Limit`: Maximum requests allowed in the window
//! - `X-RateLimit-Remaining`: Requests remaining in the current window
//! - `X-RateLimit-Reset`: Unix timestamp when the window resets
//! - `Retry-After`: Seconds to wait (only on 429 response)
//!
//! A limiter outage fails open: the request proceeds and a warning is logged.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post, middleware};
//!
//! let policy = RateLimitPolicy::payments(limiter);
//!
//! let app = Router::new()
//!     .route("/payments/order", post(handler))
//!     .layer(middleware::from_fn_with_state(policy, rate_limit_middleware));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::payments::dto::ErrorResponse;
use crate::domain::foundation::{AuthenticatedUser, ErrorCode};
use crate::ports::{RateLimitKey, RateLimitResult, RateLimitRule, RateLimiter};

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// Unix timestamp when the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// What a policy counts requests against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitSubject {
    /// Authenticated user, or client IP for anonymous callers.
    UserOrIp,
    /// Client IP only.
    Ip,
}

/// Rate limiter middleware state: one limiter plus the rule for a route group.
#[derive(Clone)]
pub struct RateLimitPolicy {
    pub limiter: Arc<dyn RateLimiter>,
    pub bucket: &'static str,
    pub rule: RateLimitRule,
    pub subject: RateLimitSubject,
    pub message: &'static str,
}

impl RateLimitPolicy {
    /// Order creation, capture and refund.
    pub fn payments(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            bucket: "payment",
            rule: RateLimitRule::PAYMENT,
            subject: RateLimitSubject::UserOrIp,
            message: "Too many payment requests. Please try again later.",
        }
    }

    /// Provider webhook callbacks.
    pub fn webhooks(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            bucket: "webhook",
            rule: RateLimitRule::WEBHOOK,
            subject: RateLimitSubject::Ip,
            message: "Too many webhook requests.",
        }
    }

    pub fn with_rule(mut self, rule: RateLimitRule) -> Self {
        self.rule = rule;
        self
    }

    fn key_for(&self, user: Option<&AuthenticatedUser>, client_ip: Option<&str>) -> Option<RateLimitKey> {
        match (self.subject, user, client_ip) {
            (RateLimitSubject::UserOrIp, Some(user), _) => {
                Some(RateLimitKey::user(self.bucket, &user.id))
            }
            (_, _, Some(ip)) => Some(RateLimitKey::ip(self.bucket, ip)),
            _ => None,
        }
    }
}

/// Rate limiting middleware driven by a `RateLimitPolicy`.
///
/// This middleware:
/// 1. Resolves the subject (user from extensions, or client IP)
/// 2. Counts the request against the policy's bucket
/// 3. Returns 429 Too Many Requests when the window is exhausted
/// 4. Adds rate limit headers to allowed responses
pub async fn rate_limit_middleware(
    State(policy): State<RateLimitPolicy>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(&request, connect_info.as_ref());
    let user = request.extensions().get::<AuthenticatedUser>().cloned();

    let Some(key) = policy.key_for(user.as_ref(), client_ip.as_deref()) else {
        return next.run(request).await;
    };

    let status = match policy.limiter.check(&key, &policy.rule).await {
        Ok(RateLimitResult::Allowed(status)) => Some(status),
        Ok(RateLimitResult::Denied(denied)) => {
            tracing::warn!(
                bucket = policy.bucket,
                scope = %denied.scope,
                identifier = %key.identifier,
                retry_after_secs = denied.retry_after_secs,
                "Rate limit exceeded"
            );
            return rate_limit_response(policy.message, denied.limit, denied.retry_after_secs);
        }
        Err(e) => {
            // Fail open for availability
            tracing::warn!(bucket = policy.bucket, error = %e, "Rate limiter unavailable");
            None
        }
    };

    let mut response = next.run(request).await;

    if let Some(status) = status {
        add_rate_limit_headers(
            &mut response,
            status.limit,
            status.remaining,
            status.reset_at.as_unix_secs(),
        );
    }

    response
}

/// Extract client IP from request, checking forwarded headers first.
///
/// Order of precedence:
/// 1. X-Forwarded-For header (first IP in list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
pub(crate) fn extract_client_ip<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        // First entry is the client, the rest are proxies
        if let Some(first_ip) = forwarded.split(',').next().map(str::trim) {
            if !first_ip.is_empty() {
                return Some(first_ip.to_string());
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
    {
        return Some(real_ip.trim().to_string());
    }

    connect_info.map(|ci| ci.0.ip().to_string())
}

/// Create a 429 Too Many Requests response.
fn rate_limit_response(message: &str, limit: u32, retry_after_secs: u32) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse::with_details(
            ErrorCode::RateLimited.as_str(),
            message,
            serde_json::json!({ "retryAfterSecs": retry_after_secs }),
        )),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(0u32));
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));

    response
}

/// Add rate limit headers to a response.
fn add_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32, reset_at: i64) {
    let headers = response.headers_mut();
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
    headers.insert(headers::X_RATELIMIT_RESET.clone(), HeaderValue::from(reset_at));
}
