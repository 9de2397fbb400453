//! HTTP adapters - REST API implementations.
//!
//! The payments adapter exposes the ledger; `app_router` adds the health
//! probe and is what the binary serves.

pub mod middleware;
pub mod payments;

use axum::{routing::get, Router};

pub use payments::{payments_router, PaymentsAppState};

/// GET /health - Liveness probe
pub async fn health() -> &'static str {
    "ok"
}

/// Full application router: payment routes plus `/health`.
pub fn app_router(state: PaymentsAppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(payments_router(state))
}
