//! billing_ledger - balance service
//!
//! Deposits, withdrawals and transfers over a PostgreSQL ledger, serialized
//! per account, with an advisory in-process balance cache.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billing_ledger::api::{self, AppState};
use billing_ledger::cache::{BalanceCache, InMemoryBalanceCache, NoopBalanceCache};
use billing_ledger::coordinator::Coordinator;
use billing_ledger::jobs::JobScheduler;
use billing_ledger::ledger::{LedgerStore, PgLedger};
use billing_ledger::{db, Config, OperationEngine};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "billing_ledger=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(config.log_json);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting billing_ledger server");
    tracing::info!("Connecting to database...");

    // Create database pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.store_timeout)
        .connect(&config.database_url)
        .await?;

    db::apply_schema(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedger::new(pool.clone(), config.lock_timeout));
    let cache: Arc<dyn BalanceCache> = if config.cache_enabled {
        Arc::new(InMemoryBalanceCache::new())
    } else {
        tracing::info!("Balance cache disabled");
        Arc::new(NoopBalanceCache)
    };

    let coordinator = Coordinator::new(store, cache.clone(), config.coordinator());
    let locks = coordinator.locks();
    let engine = Arc::new(OperationEngine::new(coordinator).with_fast_path_reject(config.cache_enabled));

    let scheduler = JobScheduler::new(locks)
        .with_cache(cache)
        .with_pool(pool.clone())
        .with_config(config.jobs())
        .start();

    let app = api::build_router(AppState::new(engine, config.request_timeout));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    scheduler.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
