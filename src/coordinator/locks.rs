//! Per-account lock table
//!
//! One async mutex per account, created on first use. Multi-account
//! acquisition always sorts the ids first, so two transfers over the same
//! pair in opposite directions cannot deadlock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::AccountId;

/// Held ordering tokens. Dropping the guard releases every account.
#[derive(Debug)]
pub struct AccountGuard {
    accounts: Vec<AccountId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuard {
    /// Accounts held, in acquisition order
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }

    pub fn holds(&self, account_id: AccountId) -> bool {
        self.accounts.binary_search(&account_id).is_ok()
    }
}

/// Lock table keyed by account
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        self.locks.entry(account_id).or_default().clone()
    }

    /// Acquire every listed account in ascending order.
    ///
    /// Duplicates are collapsed, so passing the same id twice is harmless.
    pub async fn acquire_all(&self, accounts: &[AccountId]) -> AccountGuard {
        let mut ordered = accounts.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for account_id in &ordered {
            guards.push(self.handle(*account_id).lock_owned().await);
        }

        AccountGuard {
            accounts: ordered,
            _guards: guards,
        }
    }

    /// Drop table entries nobody holds or waits on. Returns how many were removed.
    ///
    /// A holder or waiter always owns a clone of the entry's `Arc`, so a
    /// strong count of one means the entry is idle.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of accounts currently in the table
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
