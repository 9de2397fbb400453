//! HTTP handlers for payment endpoints.
//!
//! These handlers connect axum routes to application layer command/query handlers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::middleware::RequireAuth;
use crate::adapters::providers::ProviderRegistry;
use crate::application::handlers::payments::{
    CaptureOrderCommand, CaptureOrderHandler, CreateOrderCommand, CreateOrderHandler,
    GetLedgerStatsHandler, GetLedgerStatsQuery, HandleProviderWebhookCommand,
    HandleProviderWebhookHandler, ListPaymentMethodsHandler, ListPaymentMethodsQuery,
    ListTransactionsHandler, ListTransactionsQuery, RefundPaymentCommand, RefundPaymentHandler,
};
use crate::domain::catalog::{Catalog, ExchangeRates, PriceValidator};
use crate::domain::foundation::ErrorCode;
use crate::domain::payment::{
    Currency, IdempotencyKey, Money, PaymentError, ProviderKind, WebhookError,
};
use crate::ports::{
    AccessTokenVerifier, IdempotencyStore, RateLimiter, TransactionRepository,
    WebhookEventRepository,
};

use super::dto::{
    CaptureResponse, CreatePaymentOrderRequest, ErrorResponse, LedgerStatsResponse,
    ListTransactionsParams, OrderResponse, PaymentMethodsParams, PaymentMethodsResponse,
    RefundRequest, RefundResponse, TransactionView, TransactionsResponse, WebhookAckResponse,
};

/// Header carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Tunables that shape how payment commands behave.
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    /// Reject a second completed purchase of the same product by the same user.
    pub enforce_single_purchase: bool,
    pub price_validator: PriceValidator,
    /// How long a cached 2xx response is replayed.
    pub idempotency_ttl: Duration,
    /// How long an in-flight reservation blocks concurrent duplicates.
    pub idempotency_lock_ttl: Duration,
    /// Provider used when the order request names none.
    pub default_provider: ProviderKind,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            enforce_single_purchase: true,
            price_validator: PriceValidator::default(),
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            idempotency_lock_ttl: Duration::from_secs(60),
            default_provider: ProviderKind::Card,
        }
    }
}

/// Application state for payment routes.
#[derive(Clone)]
pub struct PaymentsAppState {
    pub catalog: Arc<Catalog>,
    pub rates: Arc<ExchangeRates>,
    pub providers: ProviderRegistry,
    pub transactions: Arc<dyn TransactionRepository>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub token_verifier: Arc<dyn AccessTokenVerifier>,
    pub policy: PaymentPolicy,
}

impl PaymentsAppState {
    pub fn create_order_handler(&self) -> CreateOrderHandler {
        CreateOrderHandler::new(
            self.catalog.clone(),
            self.rates.clone(),
            self.providers.clone(),
            self.transactions.clone(),
        )
        .with_single_purchase(self.policy.enforce_single_purchase)
        .with_price_validator(self.policy.price_validator)
    }

    pub fn capture_order_handler(&self) -> CaptureOrderHandler {
        CaptureOrderHandler::new(self.providers.clone(), self.transactions.clone())
            .with_price_validator(self.policy.price_validator)
    }

    pub fn refund_payment_handler(&self) -> RefundPaymentHandler {
        RefundPaymentHandler::new(self.providers.clone(), self.transactions.clone())
    }

    pub fn webhook_handler(&self) -> HandleProviderWebhookHandler {
        HandleProviderWebhookHandler::new(
            self.providers.clone(),
            self.transactions.clone(),
            self.webhook_events.clone(),
        )
    }

    pub fn list_transactions_handler(&self) -> ListTransactionsHandler {
        ListTransactionsHandler::new(self.transactions.clone())
    }

    pub fn ledger_stats_handler(&self) -> GetLedgerStatsHandler {
        GetLedgerStatsHandler::new(self.transactions.clone())
    }

    pub fn payment_methods_handler(&self) -> ListPaymentMethodsHandler {
        ListPaymentMethodsHandler::new(self.providers.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /payments/methods - Payment methods offered in a country
pub async fn list_payment_methods(
    State(state): State<PaymentsAppState>,
    Query(params): Query<PaymentMethodsParams>,
) -> impl IntoResponse {
    let handler = state.payment_methods_handler();
    let methods = handler.handle(ListPaymentMethodsQuery {
        country: params.country.clone(),
    });

    Json(PaymentMethodsResponse::new(params.country, &methods))
}

/// GET /payments/transactions - The caller's most recent transactions
pub async fn list_transactions(
    State(state): State<PaymentsAppState>,
    RequireAuth(user): RequireAuth,
    Query(params): Query<ListTransactionsParams>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.list_transactions_handler();
    let transactions = handler
        .handle(ListTransactionsQuery {
            user_id: user.id,
            limit: params.limit,
        })
        .await
        .map_err(PaymentError::from)?;

    Ok(Json(TransactionsResponse {
        transactions: transactions.iter().map(TransactionView::from).collect(),
    }))
}

/// GET /payments/admin/stats - Ledger counts and revenue (admin only)
pub async fn ledger_stats(
    State(state): State<PaymentsAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.ledger_stats_handler();
    let stats = handler.handle(GetLedgerStatsQuery { actor: user }).await?;

    Ok(Json(LedgerStatsResponse::from(stats)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /payments/order - Open an order with a provider
pub async fn create_order(
    State(state): State<PaymentsAppState>,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentOrderRequest>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let idempotency_key = idempotency_key(&headers)?;

    let provider = match request.provider.as_deref() {
        Some(name) => ProviderKind::from_str(name)?,
        None => state.policy.default_provider,
    };
    let currency = match request.currency.as_deref() {
        Some(code) => Currency::from_str(code)
            .map_err(|_| PaymentError::UnsupportedCurrency(code.to_string()))?,
        None => state.catalog.base_currency(),
    };
    let expected_amount = request
        .amount
        .as_deref()
        .map(|raw| Money::parse_decimal(raw, currency))
        .transpose()?;

    let handler = state.create_order_handler();
    let result = handler
        .handle(CreateOrderCommand {
            user_id: user.id,
            product_id: request.product_id,
            currency,
            provider,
            expected_amount,
            idempotency_key,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse::new(&result.transaction, result.approval_link)),
    ))
}

/// POST /payments/order/:order_id/capture - Capture an approved order
pub async fn capture_order(
    State(state): State<PaymentsAppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, PaymentApiError> {
    let idempotency_key = idempotency_key(&headers)?;

    let handler = state.capture_order_handler();
    let result = handler
        .handle(CaptureOrderCommand {
            actor: user,
            provider_order_id: order_id,
            idempotency_key,
        })
        .await?;

    Ok(Json(CaptureResponse::from(&result.transaction)))
}

/// POST /payments/refund/:capture_id - Refund a capture (admin only)
pub async fn refund_payment(
    State(state): State<PaymentsAppState>,
    RequireAuth(user): RequireAuth,
    Path(capture_id): Path<String>,
    headers: HeaderMap,
    request: Option<Json<RefundRequest>>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let idempotency_key = idempotency_key(&headers)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let handler = state.refund_payment_handler();
    let result = handler
        .handle(RefundPaymentCommand {
            actor: user,
            capture_id,
            amount: request.amount,
            idempotency_key,
        })
        .await?;

    Ok(Json(RefundResponse {
        transaction_id: result.transaction.id.to_string(),
        refund_id: result.refund.id,
        status: result.transaction.status.as_str().to_string(),
        refund_status: result.refund.status.as_str().to_string(),
    }))
}

/// POST /payments/webhook/:provider - Provider event callback
///
/// Unauthenticated; trust comes from the provider signature. Anything the
/// ledger cannot apply is still acknowledged with 200 so the provider stops
/// redelivering. Only signature, content-type and storage failures are not.
pub async fn provider_webhook(
    State(state): State<PaymentsAppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let provider = ProviderKind::from_str(&provider)
        .map_err(|_| WebhookError::UnknownProvider(provider.clone()))?;

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(WebhookError::InvalidContentType.into());
    }

    let handler = state.webhook_handler();
    let result = handler
        .handle(HandleProviderWebhookCommand {
            provider,
            headers,
            body: body.to_vec(),
        })
        .await?;

    let ack = if result.is_duplicate() {
        WebhookAckResponse::duplicate()
    } else {
        WebhookAckResponse::received()
    };
    Ok(Json(ack))
}

fn idempotency_key(headers: &HeaderMap) -> Result<IdempotencyKey, PaymentError> {
    IdempotencyKey::from_header(
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok()),
    )
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error wrapper for payment command and query errors.
#[derive(Debug)]
pub struct PaymentApiError(pub PaymentError);

impl From<PaymentError> for PaymentApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl From<crate::domain::foundation::ValidationError> for PaymentApiError {
    fn from(err: crate::domain::foundation::ValidationError) -> Self {
        Self(PaymentError::from(err))
    }
}

impl PaymentApiError {
    pub fn status_code(&self) -> StatusCode {
        use PaymentError::*;
        match &self.0 {
            MissingIdempotencyKey
            | InvalidIdempotencyKey(_)
            | PriceMismatch { .. }
            | UnsupportedCurrency(_)
            | ValidationFailed { .. }
            | UnknownProvider(_)
            | AlreadyPurchased { .. } => StatusCode::BAD_REQUEST,
            ProductNotFound(_) | TransactionNotFound(_) => StatusCode::NOT_FOUND,
            ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProviderRejected { .. } => StatusCode::BAD_GATEWAY,
            InvalidSignature { .. } => StatusCode::UNAUTHORIZED,
            Forbidden(_) => StatusCode::FORBIDDEN,
            InvalidTransition { .. } | DuplicateProviderOrder { .. } | IdempotencyKeyInUse => {
                StatusCode::CONFLICT
            }
            Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaymentApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.0.code().as_str();

        let body = match &self.0 {
            PaymentError::PriceMismatch { expected, claimed } => ErrorResponse::with_details(
                code,
                self.0.to_string(),
                serde_json::json!({
                    "expected": expected.to_decimal_string(),
                    "claimed": claimed.to_decimal_string(),
                    "currency": expected.currency().code(),
                }),
            ),
            PaymentError::AlreadyPurchased { product_id } => ErrorResponse::with_details(
                code,
                self.0.to_string(),
                serde_json::json!({ "productId": product_id }),
            ),
            PaymentError::Storage(message) => {
                tracing::error!(error = %message, "Payment storage failure");
                ErrorResponse::new(ErrorCode::InternalError.as_str(), "Internal server error")
            }
            other => ErrorResponse::new(code, other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

/// API error wrapper for webhook failures.
#[derive(Debug)]
pub struct WebhookApiError(pub WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if self.0.is_retryable() {
            tracing::error!(error = %self.0, "Webhook processing failed; provider will retry");
        }
        let message = match &self.0 {
            WebhookError::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse::new(self.0.code().as_str(), message))).into_response()
    }
}
