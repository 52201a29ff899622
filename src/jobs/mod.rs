//! Scheduled Jobs
//!
//! Background maintenance that keeps long-running instances healthy.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::time::interval;

use crate::cache::BalanceCache;
use crate::coordinator::AccountLocks;

// =========================================================================
// Lock table pruning
// =========================================================================

/// Remove idle entries from the per-account lock table.
/// Without this, every account ever touched keeps a mutex alive.
pub fn prune_account_locks(locks: &AccountLocks) -> usize {
    let removed = locks.prune_idle();

    if removed > 0 {
        tracing::debug!(
            removed = removed,
            remaining = locks.len(),
            "Pruned idle account locks"
        );
    }

    removed
}

// =========================================================================
// Balance cache eviction
// =========================================================================

/// Drop cached balances nobody has touched for `max_idle`.
/// Evicted accounts are simply read through from the store next time.
pub fn evict_idle_balances(cache: &dyn BalanceCache, max_idle: Duration) -> usize {
    let evicted = cache.evict_idle(max_idle);

    if evicted > 0 {
        tracing::debug!(evicted = evicted, "Evicted idle cached balances");
    }

    evicted
}

// =========================================================================
// Database heartbeat
// =========================================================================

/// Check that the ledger database still answers
pub async fn database_heartbeat(pool: &PgPool) -> Result<(), JobError> {
    crate::db::verify_connection(pool).await?;
    Ok(())
}

/// Job scheduler configuration
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    pub lock_prune_interval: Duration,
    pub heartbeat_interval: Duration,
    pub cache_evict_interval: Duration,
    /// Cached balances unused for this long are dropped
    pub cache_max_idle: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            lock_prune_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            cache_evict_interval: Duration::from_secs(60),
            cache_max_idle: Duration::from_secs(300),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    locks: Arc<AccountLocks>,
    cache: Option<Arc<dyn BalanceCache>>,
    pool: Option<PgPool>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(locks: Arc<AccountLocks>) -> Self {
        Self {
            locks,
            cache: None,
            pool: None,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Also evict idle entries from `cache`
    pub fn with_cache(mut self, cache: Arc<dyn BalanceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Also run the database heartbeat against `pool`
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Create with custom configuration
    pub fn with_config(mut self, config: JobSchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut prune_interval = interval(self.config.lock_prune_interval);
        let mut heartbeat_interval = interval(self.config.heartbeat_interval);
        let mut evict_interval = interval(self.config.cache_evict_interval);

        loop {
            tokio::select! {
                _ = prune_interval.tick() => {
                    prune_account_locks(&self.locks);
                }
                _ = evict_interval.tick() => {
                    if let Some(cache) = &self.cache {
                        evict_idle_balances(cache.as_ref(), self.config.cache_max_idle);
                    }
                }
                _ = heartbeat_interval.tick() => {
                    if let Some(pool) = &self.pool {
                        if let Err(e) = database_heartbeat(pool).await {
                            tracing::error!(error = %e, "Database heartbeat failed");
                        }
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport {
            locks_pruned: prune_account_locks(&self.locks),
            ..MaintenanceReport::default()
        };

        if let Some(cache) = &self.cache {
            report.balances_evicted = evict_idle_balances(cache.as_ref(), self.config.cache_max_idle);
        }

        if let Some(pool) = &self.pool {
            if let Err(e) = database_heartbeat(pool).await {
                report.errors.push(format!("Database heartbeat: {}", e));
            }
        }

        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub locks_pruned: usize,
    pub balances_evicted: usize,
    pub errors: Vec<String>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =========================================================================
// Tests
// =========================================================================
