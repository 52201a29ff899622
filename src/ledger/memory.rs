//! In-memory ledger
//!
//! Single-writer store: every operation runs inside one critical section,
//! which makes the funds check and the write a single atomic unit.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{LedgerStore, StoreError, TransferBalances};
use crate::domain::{AccountId, Amount, AmountError, Balance};

/// Process-local ledger, used for tests and single-node deployments without a database
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<AccountId, Balance>>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger pre-populated with balances
    pub fn with_balances(balances: impl IntoIterator<Item = (AccountId, Balance)>) -> Self {
        Self {
            accounts: Mutex::new(balances.into_iter().collect()),
        }
    }

    /// Copy of all balances, sorted by account
    pub fn snapshot(&self) -> Vec<(AccountId, Balance)> {
        let mut all: Vec<_> = match self.accounts.lock() {
            Ok(accounts) => accounts.iter().map(|(id, b)| (*id, *b)).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(id, b)| (*id, *b))
                .collect(),
        };
        all.sort();
        all
    }

    fn accounts(&self) -> Result<MutexGuard<'_, HashMap<AccountId, Balance>>, StoreError> {
        self.accounts
            .lock()
            .map_err(|_| StoreError::Backend("in-memory ledger lock poisoned".to_string()))
    }
}

fn map_balance_error(account_id: AccountId, err: AmountError) -> StoreError {
    match err {
        AmountError::Insufficient { balance, requested } => StoreError::InsufficientFunds {
            account_id,
            requested,
            available: balance,
        },
        AmountError::Overflow => StoreError::Overflow(account_id),
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Balance, StoreError> {
        self.accounts()?
            .get(&account_id)
            .copied()
            .ok_or(StoreError::NotFound(account_id))
    }

    async fn apply_delta(&self, account_id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        let mut accounts = self.accounts()?;

        let current = match accounts.get(&account_id) {
            Some(balance) => *balance,
            None if delta > 0 => Balance::zero(),
            None => return Err(StoreError::NotFound(account_id)),
        };

        let next = current
            .apply_delta(delta)
            .map_err(|e| map_balance_error(account_id, e))?;
        accounts.insert(account_id, next);

        Ok(next)
    }

    async fn apply_transfer(
        &self,
        sender: AccountId,
        receiver: AccountId,
        amount: Amount,
    ) -> Result<TransferBalances, StoreError> {
        if sender == receiver {
            return Err(StoreError::SameAccount);
        }

        let mut accounts = self.accounts()?;

        let sender_balance = *accounts.get(&sender).ok_or(StoreError::NotFound(sender))?;
        // An absent receiver starts at zero; it is only written if both legs succeed
        let receiver_balance = accounts.get(&receiver).copied().unwrap_or_default();

        // Compute both legs before touching the map so a failure leaves no trace
        let sender_next = sender_balance
            .debit(&amount)
            .map_err(|e| map_balance_error(sender, e))?;
        let receiver_next = receiver_balance
            .credit(&amount)
            .map_err(|e| map_balance_error(receiver, e))?;

        accounts.insert(sender, sender_next);
        accounts.insert(receiver, receiver_next);

        Ok(TransferBalances {
            sender: sender_next,
            receiver: receiver_next,
        })
    }
}
