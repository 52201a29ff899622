//! Balance Cache
//!
//! Advisory, process-local mirror of recently seen balances.
//! Nothing here is ever the authority for committing a mutation: the engine
//! may use a cached value to reject an obviously doomed withdrawal early,
//! but the binding funds check happens inside the ledger store.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::domain::{AccountId, Balance};

/// Cache contract. Implementations must never perform I/O.
pub trait BalanceCache: Send + Sync {
    /// Pure lookup
    fn get(&self, account_id: AccountId) -> Option<Balance>;

    /// Unconditional overwrite; only called after a store write or read succeeded
    fn set(&self, account_id: AccountId, balance: Balance);

    /// Drop the entry so the next read goes to the store
    fn invalidate(&self, account_id: AccountId);

    /// Drop entries not read or written for `max_idle`; returns how many went
    fn evict_idle(&self, _max_idle: Duration) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    balance: Balance,
    last_used: Instant,
}

/// Concurrent in-memory cache.
///
/// `DashMap` shards its locks, so lookups for different accounts do not
/// contend with each other. Entries live until invalidated or until
/// [`BalanceCache::evict_idle`] finds them unused.
#[derive(Debug, Default)]
pub struct InMemoryBalanceCache {
    entries: DashMap<AccountId, CacheEntry>,
}

impl InMemoryBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached accounts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BalanceCache for InMemoryBalanceCache {
    fn get(&self, account_id: AccountId) -> Option<Balance> {
        self.entries.get_mut(&account_id).map(|mut entry| {
            entry.last_used = Instant::now();
            entry.balance
        })
    }

    fn set(&self, account_id: AccountId, balance: Balance) {
        self.entries.insert(
            account_id,
            CacheEntry {
                balance,
                last_used: Instant::now(),
            },
        );
    }

    fn invalidate(&self, account_id: AccountId) {
        self.entries.remove(&account_id);
    }

    fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_used) < max_idle);
        before.saturating_sub(self.entries.len())
    }
}

/// Cache that never holds anything.
///
/// Used when several service instances share one ledger, where a
/// process-local mirror could only ever be stale.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBalanceCache;

impl BalanceCache for NoopBalanceCache {
    fn get(&self, _account_id: AccountId) -> Option<Balance> {
        None
    }

    fn set(&self, _account_id: AccountId, _balance: Balance) {}

    fn invalidate(&self, _account_id: AccountId) {}
}
