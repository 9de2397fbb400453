//! Axum router configuration for payment endpoints.
//!
//! This module defines the route structure for payment-related API endpoints
//! and wires them to their corresponding handlers and middleware.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::adapters::http::middleware::{
    auth_middleware, idempotency_middleware, rate_limit_middleware, IdempotencyGuard,
    RateLimitPolicy,
};

use super::handlers::{
    capture_order, create_order, ledger_stats, list_payment_methods, list_transactions,
    provider_webhook, refund_payment, PaymentsAppState,
};

/// Payment commands.
///
/// # Routes (require authentication and an `Idempotency-Key`)
/// - `POST /order` - Open an order with a provider
/// - `POST /order/:order_id/capture` - Capture an approved order
/// - `POST /refund/:capture_id` - Refund a capture (admin only)
///
/// Rate limited per user at 10 requests per 15 minutes. The rate limit runs
/// before the idempotency guard.
pub fn command_routes(state: &PaymentsAppState) -> Router<PaymentsAppState> {
    let guard = IdempotencyGuard::new(
        state.idempotency.clone(),
        state.policy.idempotency_ttl,
        state.policy.idempotency_lock_ttl,
    );
    let limit = RateLimitPolicy::payments(state.rate_limiter.clone());

    Router::new()
        .route("/order", post(create_order))
        .route("/order/:order_id/capture", post(capture_order))
        .route("/refund/:capture_id", post(refund_payment))
        .route_layer(middleware::from_fn_with_state(guard, idempotency_middleware))
        .route_layer(middleware::from_fn_with_state(limit, rate_limit_middleware))
}

/// Read-only payment endpoints.
///
/// # Routes
/// - `GET /methods?country=BR` - Payment methods for a country (public)
/// - `GET /transactions?limit=10` - Caller's recent transactions
/// - `GET /admin/stats` - Ledger counts and revenue (admin only)
pub fn query_routes() -> Router<PaymentsAppState> {
    Router::new()
        .route("/methods", get(list_payment_methods))
        .route("/transactions", get(list_transactions))
        .route("/admin/stats", get(ledger_stats))
}

/// Provider webhook router.
///
/// Webhooks carry no user token; they are verified by signature and rate
/// limited per source IP.
///
/// # Routes
/// - `POST /webhook/:provider` - Provider event callback
pub fn webhook_routes(state: &PaymentsAppState) -> Router<PaymentsAppState> {
    let limit = RateLimitPolicy::webhooks(state.rate_limiter.clone());

    Router::new()
        .route("/webhook/:provider", post(provider_webhook))
        .route_layer(middleware::from_fn_with_state(limit, rate_limit_middleware))
}

/// Create the complete payments router, mounted at `/payments`.
///
/// Token verification wraps every route so rate limiting and the idempotency
/// guard see the caller.
///
/// # Example
///
/// ```ignore
/// let app = Router::new().merge(payments_router(state));
/// ```
pub fn payments_router(state: PaymentsAppState) -> Router {
    let verifier = state.token_verifier.clone();

    let payments = Router::new()
        .merge(command_routes(&state))
        .merge(query_routes())
        .merge(webhook_routes(&state));

    Router::new()
        .nest("/payments", payments)
        .layer(middleware::from_fn_with_state(verifier, auth_middleware))
        .with_state(state)
}
