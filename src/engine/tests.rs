//! Engine behaviour tests
//!
//! Run against the in-memory ledger wrapped in a store that can inject
//! transient faults, lost commit acknowledgements and slow writes.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::cache::{BalanceCache, InMemoryBalanceCache};
    use crate::coordinator::{Coordinator, CoordinatorConfig, RetryPolicy};
    use crate::domain::{AccountId, Amount, AmountError, Balance, LedgerError, OperationContext};
    use crate::engine::{DepositCommand, OperationEngine, TransferCommand, WithdrawCommand};
    use crate::ledger::{InMemoryLedger, LedgerStore, StoreError, TransferBalances};

    // =========================================================================
    // Fault-injecting store
    // =========================================================================

    #[derive(Debug, Default)]
    struct FaultyStore {
        inner: InMemoryLedger,
        calls: AtomicU32,
        transient_failures: AtomicU32,
        lose_commit_ack: AtomicBool,
        broken: AtomicBool,
        write_delay_ms: AtomicU64,
    }

    impl FaultyStore {
        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail_next_writes(&self, n: u32) {
            self.transient_failures.store(n, Ordering::SeqCst);
        }

        fn break_backend(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }

        fn lose_commit_ack(&self, enabled: bool) {
            self.lose_commit_ack.store(enabled, Ordering::SeqCst);
        }

        fn delay_writes(&self, delay: Duration) {
            self.write_delay_ms
                .store(delay.as_millis() as u64, Ordering::SeqCst);
        }

        async fn before_write(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Transient("could not obtain lock".to_string()));
            }
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("relation \"wallet\" does not exist".to_string()));
            }
            let delay = self.write_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Ok(())
        }

        fn after_write<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
            match result {
                Ok(_) if self.lose_commit_ack.load(Ordering::SeqCst) => Err(
                    StoreError::Indeterminate("connection reset during commit".to_string()),
                ),
                other => other,
            }
        }
    }

    #[async_trait]
    impl LedgerStore for FaultyStore {
        fn name(&self) -> &'static str {
            "faulty"
        }

        async fn get_balance(&self, account_id: AccountId) -> Result<Balance, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_balance(account_id).await
        }

        async fn apply_delta(&self, account_id: AccountId, delta: i64) -> Result<Balance, StoreError> {
            self.before_write().await?;
            let result = self.inner.apply_delta(account_id, delta).await;
            self.after_write(result)
        }

        async fn apply_transfer(
            &self,
            sender: AccountId,
            receiver: AccountId,
            amount: Amount,
        ) -> Result<TransferBalances, StoreError> {
            self.before_write().await?;
            let result = self.inner.apply_transfer(sender, receiver, amount).await;
            self.after_write(result)
        }
    }

    // =========================================================================
    // Harness
    // =========================================================================

    struct Harness {
        engine: Arc<OperationEngine>,
        store: Arc<FaultyStore>,
        cache: Arc<InMemoryBalanceCache>,
    }

    fn fast_retry() -> CoordinatorConfig {
        CoordinatorConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
            ..CoordinatorConfig::default()
        }
    }

    fn harness_with(config: CoordinatorConfig, fast_path: bool) -> Harness {
        let store = Arc::new(FaultyStore::default());
        let cache = Arc::new(InMemoryBalanceCache::new());
        let coordinator = Coordinator::new(store.clone(), cache.clone(), config);
        let engine = OperationEngine::new(coordinator).with_fast_path_reject(fast_path);
        Harness {
            engine: Arc::new(engine),
            store,
            cache,
        }
    }

    fn harness() -> Harness {
        harness_with(fast_retry(), true)
    }

    fn id(n: i64) -> AccountId {
        AccountId::new(n)
    }

    fn ctx() -> OperationContext {
        OperationContext::new()
    }

    async fn seed(h: &Harness, account: i64, amount: i64) {
        h.engine
            .deposit(DepositCommand::new(account, amount), &ctx())
            .await
            .unwrap();
    }

    async fn stored(h: &Harness, account: i64) -> i64 {
        h.store.inner.get_balance(id(account)).await.unwrap().value()
    }

    // =========================================================================
    // Scenario
    // =========================================================================

    #[tokio::test]
    async fn test_basic_scenario() {
        let h = harness();
        let ctx = ctx();

        let deposit = h.engine.deposit(DepositCommand::new(1, 100), &ctx).await.unwrap();
        assert_eq!(deposit.new_balance.value(), 100);
        assert_eq!(h.engine.get_balance(id(1), &ctx).await.unwrap().value(), 100);

        let overdraft = h.engine.withdraw(WithdrawCommand::new(1, 150), &ctx).await;
        assert!(matches!(overdraft, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(h.engine.get_balance(id(1), &ctx).await.unwrap().value(), 100);

        let transfer = h
            .engine
            .transfer(TransferCommand::new(1, 2, 40), &ctx)
            .await
            .unwrap();
        assert_eq!(transfer.sender_balance.value(), 60);
        assert_eq!(transfer.receiver_balance.value(), 40);

        let same = h.engine.transfer(TransferCommand::new(1, 1, 10), &ctx).await;
        assert_eq!(same, Err(LedgerError::SameAccount));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[tokio::test]
    async fn test_invalid_amount_never_touches_store() {
        let h = harness();
        let ctx = ctx();

        let withdraw = h.engine.withdraw(WithdrawCommand::new(7, -5), &ctx).await;
        assert_eq!(
            withdraw,
            Err(LedgerError::InvalidAmount(AmountError::NotPositive(-5)))
        );

        let deposit = h.engine.deposit(DepositCommand::new(7, 0), &ctx).await;
        assert!(matches!(deposit, Err(LedgerError::InvalidAmount(_))));

        let transfer = h.engine.transfer(TransferCommand::new(7, 8, 0), &ctx).await;
        assert!(matches!(transfer, Err(LedgerError::InvalidAmount(_))));

        let same = h.engine.transfer(TransferCommand::new(7, 7, 10), &ctx).await;
        assert_eq!(same, Err(LedgerError::SameAccount));

        assert_eq!(h.store.calls(), 0);
        assert!(h.engine.coordinator().locks().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_from_unknown_account() {
        let h = harness();
        let result = h.engine.withdraw(WithdrawCommand::new(3, 10), &ctx()).await;
        assert_eq!(result, Err(LedgerError::AccountNotFound(id(3))));
    }

    #[tokio::test]
    async fn test_transfer_from_unknown_sender_creates_nothing() {
        let h = harness();

        let result = h.engine.transfer(TransferCommand::new(9, 1, 10), &ctx()).await;
        assert_eq!(result, Err(LedgerError::AccountNotFound(id(9))));
        assert!(h.store.inner.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_creates_receiver_and_caches_it() {
        let h = harness();
        seed(&h, 1, 100).await;

        let result = h
            .engine
            .transfer(TransferCommand::new(1, 9, 10), &ctx())
            .await
            .unwrap();
        assert_eq!(result.receiver_balance.value(), 10);
        assert_eq!(stored(&h, 9).await, 10);
        assert_eq!(h.cache.get(id(9)), Some(Balance::new(10).unwrap()));
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_lost_update_under_race() {
        for _ in 0..25 {
            let h = harness();
            seed(&h, 1, 100).await;

            let (a, b) = tokio::join!(
                {
                    let engine = h.engine.clone();
                    tokio::spawn(async move {
                        engine.withdraw(WithdrawCommand::new(1, 60), &OperationContext::new()).await
                    })
                },
                {
                    let engine = h.engine.clone();
                    tokio::spawn(async move {
                        engine.withdraw(WithdrawCommand::new(1, 60), &OperationContext::new()).await
                    })
                }
            );
            let results = [a.unwrap(), b.unwrap()];

            let committed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(committed.len(), 1, "exactly one withdrawal must win: {:?}", results);
            assert_eq!(committed[0].new_balance.value(), 40);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. }))));
            assert_eq!(stored(&h, 1).await, 40);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_account_linearizability() {
        let h = harness();
        seed(&h, 1, 50).await;

        let mut tasks = Vec::new();
        for i in 0..200 {
            let engine = h.engine.clone();
            tasks.push(tokio::spawn(async move {
                let ctx = OperationContext::new();
                if i % 2 == 0 {
                    engine
                        .deposit(DepositCommand::new(1, 7), &ctx)
                        .await
                        .map(|_| 7i64)
                } else {
                    engine
                        .withdraw(WithdrawCommand::new(1, 11), &ctx)
                        .await
                        .map(|_| -11i64)
                }
            }));
        }

        let reader = {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let balance = engine.get_balance(id(1), &OperationContext::new()).await.unwrap();
                    assert!(balance.value() >= 0);
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut applied = 0i64;
        for task in tasks {
            match task.await.unwrap() {
                Ok(delta) => applied += delta,
                Err(LedgerError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected failure: {:?}", other),
            }
        }
        reader.await.unwrap();

        let final_balance = stored(&h, 1).await;
        assert_eq!(final_balance, 50 + applied);
        assert!(final_balance >= 0);
        assert_eq!(
            h.engine.get_balance(id(1), &ctx()).await.unwrap().value(),
            final_balance
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_transfers_do_not_deadlock() {
        let h = harness();
        seed(&h, 1, 1_000).await;
        seed(&h, 2, 1_000).await;

        let mut tasks = Vec::new();
        for i in 0..100 {
            let engine = h.engine.clone();
            tasks.push(tokio::spawn(async move {
                let ctx = OperationContext::new();
                if i % 2 == 0 {
                    engine.transfer(TransferCommand::new(1, 2, 10), &ctx).await
                } else {
                    engine.transfer(TransferCommand::new(2, 1, 5), &ctx).await
                }
            }));
        }

        let all = async {
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(10), all)
            .await
            .expect("transfers deadlocked");

        // 50 * 10 moved 1 -> 2, 50 * 5 moved 2 -> 1
        assert_eq!(stored(&h, 1).await, 1_000 - 500 + 250);
        assert_eq!(stored(&h, 2).await, 1_000 + 500 - 250);
    }

    #[tokio::test]
    async fn test_transfer_conserves_total() {
        let h = harness();
        seed(&h, 1, 90).await;
        seed(&h, 2, 15).await;

        let before = stored(&h, 1).await + stored(&h, 2).await;
        let result = h
            .engine
            .transfer(TransferCommand::new(1, 2, 33), &ctx())
            .await
            .unwrap();
        assert_eq!(
            result.sender_balance.value() + result.receiver_balance.value(),
            before
        );

        let failed = h.engine.transfer(TransferCommand::new(2, 1, 1_000), &ctx()).await;
        assert!(matches!(failed, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(stored(&h, 1).await + stored(&h, 2).await, before);
    }

    // =========================================================================
    // Cache coherence
    // =========================================================================

    #[tokio::test]
    async fn test_cache_mirrors_committed_balances() {
        let h = harness();
        seed(&h, 1, 100).await;
        seed(&h, 2, 5).await;
        assert_eq!(h.cache.get(id(1)), Some(Balance::new(100).unwrap()));

        h.engine.withdraw(WithdrawCommand::new(1, 30), &ctx()).await.unwrap();
        assert_eq!(h.cache.get(id(1)), Some(Balance::new(70).unwrap()));

        h.engine.transfer(TransferCommand::new(1, 2, 20), &ctx()).await.unwrap();
        assert_eq!(h.cache.get(id(1)), Some(Balance::new(50).unwrap()));
        assert_eq!(h.cache.get(id(2)), Some(Balance::new(25).unwrap()));
    }

    #[tokio::test]
    async fn test_stale_high_cache_is_corrected_on_rejection() {
        let h = harness();
        seed(&h, 1, 30).await;
        h.cache.set(id(1), Balance::new(100).unwrap());

        let result = h.engine.withdraw(WithdrawCommand::new(1, 50), &ctx()).await;
        assert_eq!(
            result,
            Err(LedgerError::insufficient_funds(id(1), 50, 30))
        );
        assert_eq!(h.cache.get(id(1)), Some(Balance::new(30).unwrap()));
    }

    #[tokio::test]
    async fn test_fast_path_rejects_without_store_call() {
        let h = harness();
        seed(&h, 1, 20).await;
        let calls = h.store.calls();

        let result = h.engine.withdraw(WithdrawCommand::new(1, 50), &ctx()).await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(h.store.calls(), calls);
    }

    #[tokio::test]
    async fn test_fast_path_can_be_disabled() {
        let h = harness_with(fast_retry(), false);
        seed(&h, 1, 100).await;
        h.cache.set(id(1), Balance::new(10).unwrap());

        let result = h.engine.withdraw(WithdrawCommand::new(1, 50), &ctx()).await.unwrap();
        assert_eq!(result.new_balance.value(), 50);
        assert_eq!(h.cache.get(id(1)), Some(Balance::new(50).unwrap()));
    }

    #[tokio::test]
    async fn test_failed_transfer_drops_sender_entry_only() {
        let h = harness();
        seed(&h, 1, 10).await;
        seed(&h, 2, 10).await;

        let result = h.engine.transfer(TransferCommand::new(1, 2, 50), &ctx()).await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert!(h.cache.get(id(1)).is_none());
        assert_eq!(h.cache.get(id(2)), Some(Balance::new(10).unwrap()));
    }

    // =========================================================================
    // Transient faults and unknown outcomes
    // =========================================================================

    #[tokio::test]
    async fn test_transient_faults_are_retried() {
        let h = harness();
        seed(&h, 1, 100).await;

        h.store.fail_next_writes(2);
        let result = h.engine.withdraw(WithdrawCommand::new(1, 25), &ctx()).await.unwrap();
        assert_eq!(result.new_balance.value(), 75);
        assert_eq!(stored(&h, 1).await, 75);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_is_unavailable() {
        let h = harness();
        seed(&h, 1, 100).await;

        h.store.fail_next_writes(3);
        let result = h.engine.deposit(DepositCommand::new(1, 25), &ctx()).await;
        assert!(matches!(result, Err(LedgerError::Unavailable(_))));
        assert_eq!(stored(&h, 1).await, 100);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_retried() {
        let h = harness();
        seed(&h, 1, 100).await;
        let calls = h.store.calls();

        h.store.break_backend();
        let result = h.engine.deposit(DepositCommand::new(1, 25), &ctx()).await;

        assert!(matches!(result, Err(LedgerError::Backend(_))));
        assert_eq!(h.store.calls(), calls + 1);
        assert_eq!(stored(&h, 1).await, 100);
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_not_retried() {
        let h = harness_with(fast_retry(), false);
        seed(&h, 1, 10).await;
        let calls = h.store.calls();

        let result = h.engine.withdraw(WithdrawCommand::new(1, 50), &ctx()).await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        // One debit attempt plus one refresh read
        assert_eq!(h.store.calls(), calls + 2);
    }

    #[tokio::test]
    async fn test_lost_commit_ack_reports_unknown_and_invalidates() {
        let h = harness();
        seed(&h, 1, 100).await;
        assert!(h.cache.get(id(1)).is_some());

        h.store.lose_commit_ack(true);
        let result = h.engine.deposit(DepositCommand::new(1, 5), &ctx()).await;
        assert!(matches!(result, Err(LedgerError::Unknown(_))));
        assert!(h.cache.get(id(1)).is_none());
        h.store.lose_commit_ack(false);

        // The write did land; the next read must come from the store
        let calls = h.store.calls();
        let balance = h.engine.get_balance(id(1), &ctx()).await.unwrap();
        assert_eq!(balance.value(), 105);
        assert_eq!(h.store.calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_write_past_deadline_is_unknown() {
        let h = harness();
        seed(&h, 1, 100).await;
        seed(&h, 2, 5).await;
        assert!(h.cache.get(id(1)).is_some());
        assert!(h.cache.get(id(2)).is_some());

        h.store.delay_writes(Duration::from_millis(200));
        let short = OperationContext::new().with_timeout(Duration::from_millis(30));
        let result = h.engine.transfer(TransferCommand::new(1, 2, 10), &short).await;

        assert!(matches!(result, Err(LedgerError::Unknown(_))));
        assert!(h.cache.get(id(1)).is_none());
        assert!(h.cache.get(id(2)).is_none());
    }

    #[tokio::test]
    async fn test_store_timeout_applies_without_deadline() {
        let config = CoordinatorConfig {
            store_timeout: Duration::from_millis(20),
            ..fast_retry()
        };
        let h = harness_with(config, true);
        seed(&h, 1, 100).await;

        h.store.delay_writes(Duration::from_millis(200));
        let result = h.engine.withdraw(WithdrawCommand::new(1, 10), &ctx()).await;
        assert!(matches!(result, Err(LedgerError::Unknown(_))));
        assert!(h.cache.get(id(1)).is_none());
    }
}
