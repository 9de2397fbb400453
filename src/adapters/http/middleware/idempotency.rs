//! Idempotency guard for payment commands.
//!
//! Every mutating payment request must carry an `Idempotency-Key` (UUID).
//! The guard turns retries of the same request into replays:
//!
//! ```text
//! key cached?      → replay stored status + body, `Idempotent-Replayed: true`
//! reserve key      → lost the race: replay if finished, else 409
//! run handler      → 2xx: store response for the TTL
//!                    otherwise: release so the client can retry
//! ```
//!
//! Keys are scoped by caller, method and path so two users can never collide.
//! When the store is unreachable the request is refused with 503 rather than
//! risking a double charge.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::payments::dto::ErrorResponse;
use crate::adapters::http::payments::{PaymentApiError, IDEMPOTENCY_KEY_HEADER};
use crate::domain::foundation::{AuthenticatedUser, DomainError, ErrorCode, Timestamp};
use crate::domain::payment::{IdempotencyKey, PaymentError};
use crate::ports::{IdempotencyRecord, IdempotencyStore};

/// Set on responses served from the idempotency cache.
pub static IDEMPOTENT_REPLAYED: HeaderName = HeaderName::from_static("idempotent-replayed");

/// Largest response body the guard will cache.
const MAX_CACHED_BODY_BYTES: usize = 64 * 1024;

/// Middleware state for the idempotency guard.
#[derive(Clone)]
pub struct IdempotencyGuard {
    pub store: Arc<dyn IdempotencyStore>,
    /// How long a completed response is replayed.
    pub ttl: Duration,
    /// How long an in-flight reservation lives if the handler never finishes.
    pub lock_ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration, lock_ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            lock_ttl,
        }
    }
}

/// Cache key for one caller's request.
fn scoped_key(user: Option<&AuthenticatedUser>, method: &str, path: &str, key: &IdempotencyKey) -> String {
    let caller = user.map(|u| u.id.as_str()).unwrap_or("anonymous");
    format!("idem:{}:{}:{}:{}", caller, method, path, key)
}

pub async fn idempotency_middleware(
    State(guard): State<IdempotencyGuard>,
    request: Request,
    next: Next,
) -> Response {
    let raw = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let key = match IdempotencyKey::from_header(raw) {
        Ok(key) => key,
        Err(err) => return PaymentApiError(err).into_response(),
    };

    let user = request.extensions().get::<AuthenticatedUser>().cloned();
    let cache_key = scoped_key(
        user.as_ref(),
        request.method().as_str(),
        request.uri().path(),
        &key,
    );

    match guard.store.get(&cache_key).await {
        Ok(Some(record)) => return replay(record),
        Ok(None) => {}
        Err(err) => return store_unavailable(&err),
    }

    let token = match guard.store.try_reserve(&cache_key, guard.lock_ttl).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            // Lost the race: the other request may have finished meanwhile
            return match guard.store.get(&cache_key).await {
                Ok(Some(record)) => replay(record),
                Ok(None) => {
                    tracing::info!(idempotency_key = %key, "Concurrent request with same key");
                    PaymentApiError(PaymentError::IdempotencyKeyInUse).into_response()
                }
                Err(err) => store_unavailable(&err),
            };
        }
        Err(err) => return store_unavailable(&err),
    };

    let response = next.run(request).await;

    if !response.status().is_success() {
        if let Err(err) = guard.store.release(&cache_key, &token).await {
            tracing::warn!(idempotency_key = %key, error = %err, "Failed to release idempotency key");
        }
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(idempotency_key = %key, error = %err, "Failed to buffer response body");
            if let Err(err) = guard.store.release(&cache_key, &token).await {
                tracing::warn!(idempotency_key = %key, error = %err, "Failed to release idempotency key");
            }
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    ErrorCode::InternalError.as_str(),
                    "Internal server error",
                )),
            )
                .into_response();
        }
    };

    let record = IdempotencyRecord {
        key: cache_key,
        status_code: parts.status.as_u16(),
        content_type: parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: bytes.to_vec(),
        created_at: Timestamp::now(),
    };
    if let Err(err) = guard.store.store(record, guard.ttl).await {
        // The command already ran; a retry will hit the reservation until it expires.
        tracing::error!(idempotency_key = %key, error = %err, "Failed to cache idempotent response");
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn replay(record: IdempotencyRecord) -> Response {
    let status = StatusCode::from_u16(record.status_code).unwrap_or(StatusCode::OK);
    let mut response = (status, Bytes::from(record.body)).into_response();

    let headers = response.headers_mut();
    if let Some(content_type) = record
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers.insert(IDEMPOTENT_REPLAYED.clone(), HeaderValue::from_static("true"));

    tracing::debug!(key = %record.key, "Replayed idempotent response");
    response
}

fn store_unavailable(err: &DomainError) -> Response {
    tracing::error!(error = %err, "Idempotency store unavailable; refusing payment request");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new(
            ErrorCode::IdempotencyStoreUnavailable.as_str(),
            "Payment service temporarily unavailable. Please retry.",
        )),
    )
        .into_response()
}
