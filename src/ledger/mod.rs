//! Ledger Store module
//!
//! Durable, authoritative record of every account balance.
//! Each mutating call is one atomic check-and-apply against the backend;
//! callers never read, decide and write as separate steps.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::{AccountId, Amount, Balance};

pub use error::StoreError;
pub use memory::InMemoryLedger;
pub use postgres::PgLedger;

/// Post-transfer balances of both parties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferBalances {
    pub sender: Balance,
    pub receiver: Balance,
}

/// Durable balance storage.
///
/// Implementations never retry on their own; retry policy lives in the
/// coordinator.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Read the stored balance. Fails with `NotFound` for unknown accounts.
    async fn get_balance(&self, account_id: AccountId) -> Result<Balance, StoreError>;

    /// Atomically add `delta` to the balance.
    ///
    /// A positive delta creates the account at zero first if it is absent.
    /// A negative delta against an absent account fails with `NotFound`,
    /// and one that would leave the balance negative fails with
    /// `InsufficientFunds` without writing anything.
    async fn apply_delta(&self, account_id: AccountId, delta: i64) -> Result<Balance, StoreError>;

    /// Atomically debit `sender` and credit `receiver`.
    ///
    /// Both accounts must exist. Neither leg is visible unless both commit.
    async fn apply_transfer(
        &self,
        sender: AccountId,
        receiver: AccountId,
        amount: Amount,
    ) -> Result<TransferBalances, StoreError>;
}
