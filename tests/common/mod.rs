//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use billing_ledger::api::{self, AppState};
use billing_ledger::cache::InMemoryBalanceCache;
use billing_ledger::coordinator::{Coordinator, CoordinatorConfig, RetryPolicy};
use billing_ledger::ledger::{InMemoryLedger, LedgerStore};
use billing_ledger::OperationEngine;

/// Engine plus handles on its store and cache
pub struct TestLedger {
    pub engine: Arc<OperationEngine>,
    pub store: Arc<InMemoryLedger>,
    pub cache: Arc<InMemoryBalanceCache>,
}

pub fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        store_timeout: Duration::from_secs(5),
        lock_wait: Duration::from_secs(5),
    }
}

/// Engine over a fresh in-memory ledger
pub fn memory_ledger() -> TestLedger {
    let store = Arc::new(InMemoryLedger::new());
    let cache = Arc::new(InMemoryBalanceCache::new());
    let coordinator = Coordinator::new(store.clone(), cache.clone(), coordinator_config());

    TestLedger {
        engine: Arc::new(OperationEngine::new(coordinator)),
        store,
        cache,
    }
}

/// Full HTTP router over a fresh in-memory ledger
pub fn memory_app() -> (Router, TestLedger) {
    let ledger = memory_ledger();
    let state = AppState::new(ledger.engine.clone(), Duration::from_secs(5));
    (api::build_router(state), ledger)
}

/// Connect to the test database, or `None` when `DATABASE_URL` is not set
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    billing_ledger::db::apply_schema(&pool)
        .await
        .expect("Failed to apply schema");

    Some(pool)
}

/// Engine over PostgreSQL with a fresh in-memory cache
pub fn pg_engine(pool: PgPool) -> (Arc<OperationEngine>, Arc<InMemoryBalanceCache>) {
    let store: Arc<dyn LedgerStore> = Arc::new(billing_ledger::ledger::PgLedger::new(
        pool,
        Duration::from_secs(2),
    ));
    let cache = Arc::new(InMemoryBalanceCache::new());
    let coordinator = Coordinator::new(store, cache.clone(), coordinator_config());
    (Arc::new(OperationEngine::new(coordinator)), cache)
}

/// Account ids unlikely to collide between test runs sharing one database
pub fn unique_account_ids<const N: usize>() -> [i64; N] {
    let base = (uuid::Uuid::new_v4().as_u128() % 1_000_000_000_000) as i64 * 100;
    std::array::from_fn(|i| base + i as i64 + 1)
}
