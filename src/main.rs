//! bank-core - Global Digital Bank transaction-processing service
//!
//! Exposes withdrawals, deposits, and transfers over HTTP, backed by the
//! account gateway, the daily limit ledger, and the append-only audit
//! trail. The account gateway is embedded (same database) by default and
//! switches to a remote accounts service when ACCOUNT_GATEWAY_URL is set.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bank_core::api::{self, AppState};
use bank_core::audit::PgAuditTrail;
use bank_core::engine::{PgTransactionStore, TransferEngine};
use bank_core::gateway::{AccountGateway, HttpAccountGateway, PgAccountGateway};
use bank_core::limits::PgLimitLedger;
use bank_core::Config;

/// Initialize tracing/logging. Production emits JSON lines for log
/// collectors; everything else gets the human-readable format.
fn init_tracing(json_logs: bool) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "bank_core=debug,tower_http=debug".into()),
    );

    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Build the application state from configuration.
fn build_state(config: &Config, pool: PgPool) -> anyhow::Result<AppState> {
    let gateway: Arc<dyn AccountGateway> = match &config.account_gateway_url {
        Some(url) => {
            tracing::info!(url = url.as_str(), "Using remote account gateway");
            Arc::new(HttpAccountGateway::new(url.clone(), config.call_timeout)?)
        }
        None => {
            tracing::info!("Using embedded account gateway");
            Arc::new(PgAccountGateway::new(pool.clone()))
        }
    };

    let limits = Arc::new(PgLimitLedger::new(pool.clone()));
    let audit = Arc::new(PgAuditTrail::new(pool.clone()));
    let store = Arc::new(PgTransactionStore::new(pool));

    let engine = Arc::new(TransferEngine::new(
        gateway.clone(),
        limits.clone(),
        audit.clone(),
        store,
        config.call_timeout,
    ));

    Ok(AppState {
        engine,
        gateway,
        limits,
        audit,
    })
}

/// Build the application router
fn build_router(state: AppState) -> Router {
    let api_router = api::create_router()
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(middleware::from_fn(api::middleware::context_middleware));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api_router)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting bank-core server");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    // Verify connectivity, then the schema
    bank_core::db::verify_connection(&pool).await?;
    if !bank_core::db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");
    tracing::info!("Listening on http://{}", addr);

    let state = build_state(&config, pool.clone())?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
