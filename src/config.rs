//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::coordinator::{CoordinatorConfig, RetryPolicy};
use crate::jobs::JobSchedulerConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,

    /// Keep a process-local balance cache. Disable when several instances share one ledger.
    pub cache_enabled: bool,

    /// Total store attempts per operation, including the first
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,

    /// Bound on a single store call
    pub store_timeout: Duration,

    /// Bound on waiting for account tokens and database row locks
    pub lock_timeout: Duration,

    /// Deadline applied to every HTTP request
    pub request_timeout: Duration,

    /// How often idle account locks are pruned
    pub lock_prune_interval: Duration,

    /// Cached balances unused for this long are evicted
    pub cache_max_idle: Duration,
}

/// Read an optional variable, falling back to `default`
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

fn millis_or(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    parse_or(name, default).map(Duration::from_millis)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let config = Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_json: env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false),
            cache_enabled: parse_or("CACHE_ENABLED", true)?,
            retry_max_attempts: parse_or("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay: millis_or("RETRY_BASE_DELAY_MS", 50)?,
            retry_max_delay: millis_or("RETRY_MAX_DELAY_MS", 1_000)?,
            store_timeout: millis_or("STORE_TIMEOUT_MS", 5_000)?,
            lock_timeout: millis_or("LOCK_TIMEOUT_MS", 2_000)?,
            request_timeout: millis_or("REQUEST_TIMEOUT_MS", 10_000)?,
            lock_prune_interval: parse_or("LOCK_PRUNE_INTERVAL_SECS", 60u64)
                .map(Duration::from_secs)?,
            cache_max_idle: parse_or("CACHE_MAX_IDLE_SECS", 300u64).map(Duration::from_secs)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("RETRY_MAX_ATTEMPTS"));
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("STORE_TIMEOUT_MS"));
        }
        if self.lock_prune_interval.is_zero() {
            return Err(ConfigError::InvalidValue("LOCK_PRUNE_INTERVAL_SECS"));
        }
        if self.cache_max_idle.is_zero() {
            return Err(ConfigError::InvalidValue("CACHE_MAX_IDLE_SECS"));
        }
        Ok(())
    }

    /// Coordinator tunables derived from this configuration
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            retry: RetryPolicy::new(
                self.retry_max_attempts,
                self.retry_base_delay,
                self.retry_max_delay,
            ),
            store_timeout: self.store_timeout,
            lock_wait: self.lock_timeout,
        }
    }

    /// Background job schedule derived from this configuration
    pub fn jobs(&self) -> JobSchedulerConfig {
        JobSchedulerConfig {
            lock_prune_interval: self.lock_prune_interval,
            cache_max_idle: self.cache_max_idle,
            ..JobSchedulerConfig::default()
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
