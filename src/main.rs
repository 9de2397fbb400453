use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use payment_orchestrator::adapters::auth::JwtAccessTokenVerifier;
use payment_orchestrator::adapters::http::{app_router, PaymentsAppState};
use payment_orchestrator::adapters::http::payments::{PaymentPolicy, IDEMPOTENCY_KEY_HEADER};
use payment_orchestrator::adapters::idempotency::RedisIdempotencyStore;
use payment_orchestrator::adapters::postgres::{
    PostgresTransactionRepository, PostgresWebhookEventRepository,
};
use payment_orchestrator::adapters::providers::{
    CardConfig, CardPaymentAdapter, PayPalConfig, PayPalPaymentAdapter, ProviderRegistry,
    RegionalRailAdapter, ResilientProvider,
};
use payment_orchestrator::adapters::rate_limiter::RedisRateLimiter;
use payment_orchestrator::application::handlers::payments::ExpirePendingHandler;
use payment_orchestrator::application::{Sweeper, SweeperConfig};
use payment_orchestrator::config::{AppConfig, PaymentConfig, ValidationError};
use payment_orchestrator::domain::catalog::{Catalog, PriceValidator};
use payment_orchestrator::domain::payment::ProviderKind;
use payment_orchestrator::ports::PaymentProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config);

    tracing::info!(database = %config.database.redacted_url(), "Connecting to ledger");
    let pool = config
        .database
        .connect()
        .await
        .context("Failed to connect to PostgreSQL")?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations completed");
    }

    // Redis backs idempotency records and rate limit windows
    let redis_conn = config
        .redis
        .connect()
        .await
        .context("Failed to connect to Redis")?;

    let providers = build_providers(&config.payment)?;
    tracing::info!(providers = providers.len(), "Payment providers registered");

    let transactions = Arc::new(
        PostgresTransactionRepository::new(pool.clone())
            .with_single_purchase(config.payment.enforce_single_purchase),
    );
    let webhook_events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let idempotency = Arc::new(RedisIdempotencyStore::new(redis_conn.clone()));

    let state = PaymentsAppState {
        catalog: Arc::new(Catalog::standard()),
        rates: Arc::new(config.payment.exchange_rates()?),
        providers: providers.clone(),
        transactions: transactions.clone(),
        webhook_events: webhook_events.clone(),
        idempotency: idempotency.clone(),
        rate_limiter: Arc::new(RedisRateLimiter::new(redis_conn)),
        token_verifier: Arc::new(JwtAccessTokenVerifier::new(config.auth.jwt_config())),
        policy: PaymentPolicy {
            enforce_single_purchase: config.payment.enforce_single_purchase,
            price_validator: PriceValidator::with_tolerance_bps(config.payment.price_tolerance_bps),
            idempotency_ttl: config.payment.idempotency_ttl(),
            idempotency_lock_ttl: config.payment.idempotency_lock_ttl(),
            default_provider: ProviderKind::Card,
        },
    };

    // Background housekeeping
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(
        ExpirePendingHandler::new(transactions, providers)
            .with_timeout(config.payment.pending_timeout()),
        idempotency,
        webhook_events,
        SweeperConfig {
            expiry_interval: config.payment.expiry_interval(),
            purge_interval: config.payment.purge_interval(),
            webhook_retention_days: config.payment.webhook_retention_days,
        },
    );
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let request_id = HeaderName::from_static("x-request-id");
    let app = app_router(state)
        .layer(cors_layer(&config.server.cors_origins_list()))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Payment orchestrator listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    sweeper_task.await?;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Register every provider that has credentials, each behind a timeout and retry.
fn build_providers(payment: &PaymentConfig) -> anyhow::Result<ProviderRegistry> {
    let timeout = payment.provider_timeout();
    let wrap = |inner: Arc<dyn PaymentProvider>| -> Arc<dyn PaymentProvider> {
        Arc::new(ResilientProvider::new(inner, timeout))
    };

    let api_key = payment
        .card_api_key
        .clone()
        .ok_or(ValidationError::MissingRequired("PAYMENT__CARD_API_KEY"))?;
    let webhook_secret = payment
        .card_webhook_secret
        .clone()
        .ok_or(ValidationError::MissingRequired("PAYMENT__CARD_WEBHOOK_SECRET"))?;
    let card = CardConfig::new(api_key, webhook_secret).with_require_livemode(payment.is_live_mode());

    let mut registry = ProviderRegistry::new().with(wrap(Arc::new(CardPaymentAdapter::new(card))));

    if let (Some(client_id), Some(secret), Some(webhook_id)) = (
        &payment.paypal_client_id,
        &payment.paypal_client_secret,
        &payment.paypal_webhook_id,
    ) {
        let paypal = PayPalConfig::new(
            client_id.clone(),
            secret.clone(),
            webhook_id.clone(),
            payment.paypal_mode()?,
        )
        .with_redirect_urls(&payment.return_url, &payment.cancel_url);
        registry = registry.with(wrap(Arc::new(PayPalPaymentAdapter::new(paypal))));
    }

    if let Some(secret) = &payment.regional_webhook_secret {
        for kind in [ProviderKind::Pix, ProviderKind::Sepa, ProviderKind::MercadoPago] {
            let rail = RegionalRailAdapter::new(kind, secret.clone())?;
            registry = registry.with(wrap(Arc::new(rail)));
        }
    }

    Ok(registry)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(IDEMPOTENCY_KEY_HEADER),
        ])
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
