//! End-to-end payment flows through the HTTP router.
//!
//! Every test drives the real `app_router` with in-memory adapters and a mock
//! card provider:
//! 1. Idempotent order creation replays byte-identical responses
//! 2. Price tolerance and purchase-once rules
//! 3. Webhook verification and deduplication
//! 4. Expiry of abandoned orders
//! 5. Order, capture, webhook and refund for one product

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use payment_orchestrator::adapters::auth::MockAccessTokenVerifier;
use payment_orchestrator::adapters::http::middleware::IDEMPOTENT_REPLAYED;
use payment_orchestrator::adapters::http::payments::PaymentPolicy;
use payment_orchestrator::adapters::http::{app_router, PaymentsAppState};
use payment_orchestrator::adapters::idempotency::InMemoryIdempotencyStore;
use payment_orchestrator::adapters::memory::{
    InMemoryTransactionRepository, InMemoryWebhookEventRepository,
};
use payment_orchestrator::adapters::providers::{
    MockPaymentProvider, ProviderRegistry, MOCK_SIGNATURE_HEADER,
};
use payment_orchestrator::adapters::rate_limiter::InMemoryRateLimiter;
use payment_orchestrator::application::handlers::payments::ExpirePendingHandler;
use payment_orchestrator::application::{Sweeper, SweeperConfig};
use payment_orchestrator::domain::catalog::{Catalog, ExchangeRates};
use payment_orchestrator::domain::foundation::Timestamp;
use payment_orchestrator::domain::payment::{ProviderKind, TransactionStatus, EXPIRED_REASON};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    card: Arc<MockPaymentProvider>,
    transactions: InMemoryTransactionRepository,
    webhook_events: InMemoryWebhookEventRepository,
    idempotency: Arc<InMemoryIdempotencyStore>,
    providers: ProviderRegistry,
}

impl TestApp {
    fn new() -> Self {
        Self::with_purchase_once(true)
    }

    fn with_purchase_once(enforce: bool) -> Self {
        let card = Arc::new(MockPaymentProvider::new(ProviderKind::Card));
        let providers = ProviderRegistry::new().with(card.clone());
        let transactions = InMemoryTransactionRepository::new().with_single_purchase(enforce);
        let webhook_events = InMemoryWebhookEventRepository::new();
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());

        let verifier = MockAccessTokenVerifier::new()
            .with_customer("alice-token", "alice")
            .with_customer("bob-token", "bob")
            .with_admin("admin-token", "ops");

        let state = PaymentsAppState {
            catalog: Arc::new(Catalog::standard()),
            rates: Arc::new(ExchangeRates::standard()),
            providers: providers.clone(),
            transactions: Arc::new(transactions.clone()),
            webhook_events: Arc::new(webhook_events.clone()),
            idempotency: idempotency.clone(),
            rate_limiter: Arc::new(InMemoryRateLimiter::new()),
            token_verifier: Arc::new(verifier),
            policy: PaymentPolicy {
                enforce_single_purchase: enforce,
                ..PaymentPolicy::default()
            },
        };

        Self {
            router: app_router(state),
            card,
            transactions,
            webhook_events,
            idempotency,
            providers,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn create_order(&self, token: &str, key: &str, body: Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/payments/order")
                .header("Authorization", format!("Bearer {}", token))
                .header("Idempotency-Key", key)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn capture(&self, token: &str, key: &str, order_id: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(format!("/payments/order/{}/capture", order_id))
                .header("Authorization", format!("Bearer {}", token))
                .header("Idempotency-Key", key)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn refund(&self, token: &str, key: &str, capture_id: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(format!("/payments/refund/{}", capture_id))
                .header("Authorization", format!("Bearer {}", token))
                .header("Idempotency-Key", key)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn webhook(&self, body: &str, signature: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/payments/webhook/card")
                .header("Content-Type", "application/json")
                .header(MOCK_SIGNATURE_HEADER, signature)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn signed_webhook(&self, body: &str) -> Response {
        let signature = self.card.sign_webhook(body);
        self.webhook(body, &signature).await
    }

    fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            ExpirePendingHandler::new(Arc::new(self.transactions.clone()), self.providers.clone()),
            self.idempotency.clone(),
            Arc::new(self.webhook_events.clone()),
            SweeperConfig::default(),
        )
    }
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

const REPLAY_KEY: &str = "6f1c2a7e-3b4d-4e5f-8a9b-0c1d2e3f4a5b";
const SHARED_KEY: &str = "0b9e8d7c-6a5f-4e3d-9c2b-1a0f9e8d7c6b";

fn key() -> String {
    Uuid::new_v4().to_string()
}

fn course_42() -> Value {
    json!({ "productId": "course-42" })
}

fn capture_event(event_id: &str, order_id: &str) -> String {
    json!({
        "id": event_id,
        "type": "capture.completed",
        "order_id": order_id,
        "capture_id": format!("cap_{}", order_id),
    })
    .to_string()
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn repeated_idempotency_key_replays_identical_response() {
    let app = TestApp::new();

    let first = app.create_order("alice-token", REPLAY_KEY, course_42()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    assert!(first.headers().get(&IDEMPOTENT_REPLAYED).is_none());
    let first_body = body_bytes(first).await;

    let second = app.create_order("alice-token", REPLAY_KEY, course_42()).await;
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(second.headers().get(&IDEMPOTENT_REPLAYED).unwrap(), "true");
    let second_body = body_bytes(second).await;

    assert_eq!(first_body, second_body);
    assert_eq!(app.card.call_count("create_order"), 1);
    assert_eq!(app.transactions.all().await.len(), 1);
}

#[tokio::test]
async fn same_key_from_another_user_is_not_replayed() {
    let app = TestApp::new();

    let alice = app.create_order("alice-token", SHARED_KEY, course_42()).await;
    let bob = app.create_order("bob-token", SHARED_KEY, course_42()).await;

    assert_eq!(alice.status(), StatusCode::CREATED);
    assert_eq!(bob.status(), StatusCode::CREATED);
    assert!(bob.headers().get(&IDEMPOTENT_REPLAYED).is_none());
    assert_eq!(app.card.call_count("create_order"), 2);
}

#[tokio::test]
async fn malformed_idempotency_key_is_rejected() {
    let app = TestApp::new();

    let response = app.create_order("alice-token", "bad key!", course_42()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.card.call_count("create_order"), 0);
}

// =============================================================================
// Pricing and Purchase Rules
// =============================================================================

#[tokio::test]
async fn claimed_amount_within_one_percent_is_accepted() {
    let app = TestApp::new();

    let response = app
        .create_order(
            "alice-token",
            &key(),
            json!({ "productId": "course-42", "currency": "EUR", "amount": "100.99" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    // The ledger always records the catalog price
    assert_eq!(body["amount"], "100.00");
    assert_eq!(body["currency"], "EUR");
}

#[tokio::test]
async fn claimed_amount_outside_tolerance_is_a_price_mismatch() {
    let app = TestApp::new();

    let response = app
        .create_order(
            "alice-token",
            &key(),
            json!({ "productId": "course-42", "currency": "EUR", "amount": "90.00" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "PRICE_MISMATCH");
    assert_eq!(body["details"]["expected"], "100.00");
    assert_eq!(body["details"]["claimed"], "90.00");
    assert!(app.transactions.all().await.is_empty());
}

#[tokio::test]
async fn unknown_product_is_404() {
    let app = TestApp::new();

    let response = app
        .create_order("alice-token", &key(), json!({ "productId": "course-999" }))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completed_product_cannot_be_bought_twice() {
    let app = TestApp::new();

    let order = body_json(app.create_order("alice-token", &key(), course_42()).await).await;
    let order_id = order["orderId"].as_str().unwrap().to_string();
    let capture = app.capture("alice-token", &key(), &order_id).await;
    assert_eq!(capture.status(), StatusCode::OK);

    let again = app.create_order("alice-token", &key(), course_42()).await;

    assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    let body = body_json(again).await;
    assert_eq!(body["error_code"], "ALREADY_PURCHASED");
    assert_eq!(body["details"]["productId"], "course-42");
}

#[tokio::test]
async fn repeat_purchase_completes_when_purchase_once_is_off() {
    let app = TestApp::with_purchase_once(false);

    for event in ["evt_first", "evt_second"] {
        let order = body_json(app.create_order("alice-token", &key(), course_42()).await).await;
        let order_id = order["orderId"].as_str().unwrap().to_string();

        let delivered = app.signed_webhook(&capture_event(event, &order_id)).await;
        assert_eq!(delivered.status(), StatusCode::OK);
    }

    let rows = app.transactions.all().await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|t| t.status == TransactionStatus::Completed));
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn duplicate_webhook_is_acknowledged_once() {
    let app = TestApp::new();
    let order = body_json(app.create_order("alice-token", &key(), course_42()).await).await;
    let order_id = order["orderId"].as_str().unwrap().to_string();
    let event = capture_event("evt_dup_1", &order_id);

    let first = app.signed_webhook(&event).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await, json!({ "received": true }));

    let second = app.signed_webhook(&event).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await, json!({ "received": true, "duplicate": true }));

    let transactions = app.transactions.all().await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].status, TransactionStatus::Completed);
}

#[tokio::test]
async fn tampered_webhook_is_rejected_without_touching_the_ledger() {
    let app = TestApp::new();
    let order = body_json(app.create_order("alice-token", &key(), course_42()).await).await;
    let order_id = order["orderId"].as_str().unwrap().to_string();

    let genuine = capture_event("evt_tamper", &order_id);
    let signature = app.card.sign_webhook(&genuine);
    let tampered = genuine.replace("capture.completed", "capture.refunded");

    let response = app.webhook(&tampered, &signature).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "INVALID_WEBHOOK_SIGNATURE");
    assert_eq!(app.transactions.all().await[0].status, TransactionStatus::Pending);
}

#[tokio::test]
async fn webhook_for_unknown_order_is_acknowledged() {
    let app = TestApp::new();

    let response = app.signed_webhook(&capture_event("evt_orphan", "card_order_404")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.transactions.all().await.is_empty());
}

#[tokio::test]
async fn webhook_for_unconfigured_provider_is_404() {
    let app = TestApp::new();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/payments/webhook/pix")
                .header("Content-Type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn abandoned_order_expires_and_product_can_be_bought_again() {
    let app = TestApp::new();
    let order = body_json(app.create_order("alice-token", &key(), course_42()).await).await;
    let order_id = order["orderId"].as_str().unwrap().to_string();

    // Sweep as if the pending timeout had passed
    let result = app
        .sweeper()
        .expire_once(Timestamp::now().plus_secs(31 * 60))
        .await
        .unwrap();
    assert_eq!(result.expired, 1);

    let expired = app.transactions.all().await;
    assert_eq!(expired[0].status, TransactionStatus::Failed);
    assert_eq!(expired[0].failure_reason.as_deref(), Some(EXPIRED_REASON));

    // A late capture cannot revive it
    let late = app.capture("alice-token", &key(), &order_id).await;
    assert_eq!(late.status(), StatusCode::CONFLICT);

    let retry = app.create_order("alice-token", &key(), course_42()).await;
    assert_eq!(retry.status(), StatusCode::CREATED);
    assert_eq!(app.transactions.all().await.len(), 2);
}

// =============================================================================
// Full Flow
// =============================================================================

#[tokio::test]
async fn course_purchase_end_to_end() {
    let app = TestApp::new();

    // Open the order
    let response = app.create_order("alice-token", &key(), course_42()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["provider"], "card");
    let order_id = order["orderId"].as_str().unwrap().to_string();
    assert!(order["approvalLink"].as_str().unwrap().ends_with(&order_id));

    // The provider reports the capture
    let response = app.signed_webhook(&capture_event("evt_e2e_1", &order_id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // A client-side capture afterwards sees the completed transaction
    let response = app.capture("alice-token", &key(), &order_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let capture = body_json(response).await;
    assert_eq!(capture["status"], "completed");
    let capture_id = capture["captureId"].as_str().unwrap().to_string();
    assert_eq!(capture_id, format!("cap_{}", order_id));
    assert_eq!(app.card.call_count("capture_order"), 0);

    // Buying the course again is refused
    let response = app.create_order("alice-token", &key(), course_42()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "ALREADY_PURCHASED");

    // The buyer sees the purchase
    let response = app
        .send(
            Request::builder()
                .uri("/payments/transactions")
                .header("Authorization", "Bearer alice-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let listing = body_json(response).await;
    assert_eq!(listing["transactions"][0]["status"], "completed");
    assert_eq!(listing["transactions"][0]["productId"], "course-42");

    // Customers cannot refund
    let response = app.refund("alice-token", &key(), &capture_id).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Operators can
    let response = app.refund("admin-token", &key(), &capture_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let refund = body_json(response).await;
    assert_eq!(refund["status"], "refunded");
    assert_eq!(refund["refundStatus"], "completed");

    // Revenue no longer counts the refunded sale
    let response = app
        .send(
            Request::builder()
                .uri("/payments/admin/stats")
                .header("Authorization", "Bearer admin-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["refunded"], 1);
    assert_eq!(stats["completed"], 0);
}
