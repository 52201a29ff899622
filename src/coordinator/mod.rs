//! Consistency Coordinator
//!
//! Serializes every mutation per account and keeps the balance cache
//! coherent with the ledger store.
//!
//! A mutation first obtains a [`LockedAccounts`] handle holding the ordering
//! tokens of every account it touches. Store calls and cache updates are
//! only reachable through that handle, and the tokens are released when it
//! is dropped, after the cache has been brought up to date.

mod locks;
mod retry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::BalanceCache;
use crate::domain::{AccountId, Amount, Balance, LedgerError, OperationContext};
use crate::ledger::{LedgerStore, StoreError, TransferBalances};

pub use locks::{AccountGuard, AccountLocks};
pub use retry::RetryPolicy;

/// Tunables for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub retry: RetryPolicy,
    /// Upper bound for a single store call when the caller has no deadline
    pub store_timeout: Duration,
    /// Upper bound for waiting on account tokens
    pub lock_wait: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            store_timeout: Duration::from_secs(5),
            lock_wait: Duration::from_secs(2),
        }
    }
}

/// Whether a store call can change state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Read,
    Write,
}

/// Per-account serialization over a ledger store and an advisory cache
pub struct Coordinator {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn BalanceCache>,
    locks: Arc<AccountLocks>,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("store", &self.store.name())
            .field("locks", &self.locks.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn BalanceCache>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            cache,
            locks: Arc::new(AccountLocks::new()),
            config,
        }
    }

    /// Lock table, shared with the pruning job
    pub fn locks(&self) -> Arc<AccountLocks> {
        Arc::clone(&self.locks)
    }

    /// Advisory lookup; never touches the store
    pub fn cached_balance(&self, account_id: AccountId) -> Option<Balance> {
        self.cache.get(account_id)
    }

    /// Acquire the ordering tokens of `accounts` in canonical order.
    ///
    /// Waiting stops at the caller's deadline or after `lock_wait`,
    /// whichever comes first, with `Unavailable`; nothing has been applied
    /// at that point.
    pub async fn lock<'a>(
        &'a self,
        ctx: &'a OperationContext,
        accounts: &[AccountId],
    ) -> Result<LockedAccounts<'a>, LedgerError> {
        let mut give_up = Instant::now() + self.config.lock_wait;
        if let Some(deadline) = ctx.deadline {
            give_up = give_up.min(deadline);
        }

        let guard = tokio::time::timeout_at(give_up, self.locks.acquire_all(accounts))
            .await
            .map_err(|_| {
                tracing::warn!(
                    accounts = ?accounts,
                    correlation_id = ?ctx.correlation_id,
                    "Timed out waiting for account lock"
                );
                LedgerError::Unavailable("timed out waiting for account lock".to_string())
            })?;

        Ok(LockedAccounts {
            coordinator: self,
            ctx,
            guard,
        })
    }

    /// Balance read with cache read-through.
    ///
    /// A cache hit is served without locking. On a miss the account token is
    /// taken before the store read, so a concurrent mutation can never have
    /// its fresh cache entry overwritten by an older store value.
    pub async fn read_balance(
        &self,
        ctx: &OperationContext,
        account_id: AccountId,
    ) -> Result<Balance, LedgerError> {
        if let Some(balance) = self.cache.get(account_id) {
            tracing::trace!(account_id = %account_id, "Balance served from cache");
            return Ok(balance);
        }

        let locked = self.lock(ctx, &[account_id]).await?;
        if let Some(balance) = self.cache.get(account_id) {
            return Ok(balance);
        }
        locked.load(account_id).await
    }

    /// Time budget for the next store call, or `None` when the deadline has passed
    fn call_budget(&self, ctx: &OperationContext) -> Option<Duration> {
        match ctx.remaining() {
            Some(left) if left.is_zero() => None,
            Some(left) => Some(left.min(self.config.store_timeout)),
            None => Some(self.config.store_timeout),
        }
    }

    /// Run one store call under the retry policy and the time budget.
    ///
    /// Only `StoreError::Transient` is retried. A write that times out or
    /// reports an indeterminate commit invalidates `touched` and surfaces
    /// as `Unknown`.
    async fn call_store<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        kind: CallKind,
        touched: &[AccountId],
        call: F,
    ) -> Result<T, LedgerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let budget = self.call_budget(ctx).ok_or_else(|| {
                LedgerError::Unavailable("deadline expired before store call".to_string())
            })?;

            match tokio::time::timeout(budget, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if err.is_retryable() && self.config.retry.should_retry(attempt) => {
                    let delay = self.config.retry.delay_for(attempt);
                    attempt += 1;

                    if matches!(ctx.remaining(), Some(left) if left <= delay) {
                        return Err(LedgerError::Unavailable(format!(
                            "deadline too close to retry: {}",
                            err
                        )));
                    }

                    tracing::warn!(
                        store = self.store.name(),
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        correlation_id = ?ctx.correlation_id,
                        "Transient store fault, retrying (attempt {}/{})",
                        attempt + 1,
                        self.config.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(err)) => {
                    if err.is_retryable() {
                        tracing::error!(
                            store = self.store.name(),
                            error = %err,
                            attempts = attempt + 1,
                            "Retry budget exhausted"
                        );
                        return Err(LedgerError::Unavailable(format!(
                            "retry budget exhausted: {}",
                            err
                        )));
                    }
                    if err.is_indeterminate() {
                        self.forget(touched);
                        tracing::error!(
                            accounts = ?touched,
                            error = %err,
                            correlation_id = ?ctx.correlation_id,
                            "Store write outcome unknown, cache invalidated"
                        );
                    }
                    return Err(err.into());
                }
                Err(_elapsed) => {
                    return match kind {
                        CallKind::Read => Err(LedgerError::Unavailable(
                            "store read timed out".to_string(),
                        )),
                        CallKind::Write => {
                            self.forget(touched);
                            tracing::error!(
                                accounts = ?touched,
                                timeout_ms = budget.as_millis() as u64,
                                correlation_id = ?ctx.correlation_id,
                                "Store write timed out, cache invalidated"
                            );
                            Err(LedgerError::Unknown(
                                "store write timed out with outcome unknown".to_string(),
                            ))
                        }
                    };
                }
            }
        }
    }

    fn forget(&self, accounts: &[AccountId]) {
        for account_id in accounts {
            self.cache.invalidate(*account_id);
        }
    }
}

/// Ordering tokens held for one operation.
///
/// Every store call and cache update of a mutation goes through this
/// handle; the tokens are released when it is dropped.
#[derive(Debug)]
pub struct LockedAccounts<'a> {
    coordinator: &'a Coordinator,
    ctx: &'a OperationContext,
    guard: AccountGuard,
}

impl LockedAccounts<'_> {
    fn assert_held(&self, account_id: AccountId) {
        debug_assert!(
            self.guard.holds(account_id),
            "account {} used without holding its token",
            account_id
        );
    }

    /// `LedgerStore::apply_delta` with retries and deadline handling
    pub async fn apply_delta(&self, account_id: AccountId, delta: i64) -> Result<Balance, LedgerError> {
        self.assert_held(account_id);
        let store = &self.coordinator.store;
        self.coordinator
            .call_store(self.ctx, CallKind::Write, &[account_id], || {
                store.apply_delta(account_id, delta)
            })
            .await
    }

    /// `LedgerStore::apply_transfer` with retries and deadline handling
    pub async fn apply_transfer(
        &self,
        sender: AccountId,
        receiver: AccountId,
        amount: Amount,
    ) -> Result<TransferBalances, LedgerError> {
        self.assert_held(sender);
        self.assert_held(receiver);
        let store = &self.coordinator.store;
        self.coordinator
            .call_store(self.ctx, CallKind::Write, &[sender, receiver], || {
                store.apply_transfer(sender, receiver, amount)
            })
            .await
    }

    /// Read the authoritative balance and mirror it into the cache
    pub async fn load(&self, account_id: AccountId) -> Result<Balance, LedgerError> {
        self.assert_held(account_id);
        let store = &self.coordinator.store;
        let balance = self
            .coordinator
            .call_store(self.ctx, CallKind::Read, &[account_id], || {
                store.get_balance(account_id)
            })
            .await?;
        self.coordinator.cache.set(account_id, balance);
        Ok(balance)
    }

    /// Drop the cached entry, then reload it from the store
    pub async fn refresh(&self, account_id: AccountId) -> Result<Balance, LedgerError> {
        self.invalidate(account_id);
        self.load(account_id).await
    }

    /// Mirror a committed balance into the cache
    pub fn record(&self, account_id: AccountId, balance: Balance) {
        self.assert_held(account_id);
        self.coordinator.cache.set(account_id, balance);
    }

    /// Drop the cached entry
    pub fn invalidate(&self, account_id: AccountId) {
        self.assert_held(account_id);
        self.coordinator.cache.invalidate(account_id);
    }
}
