//! Operation Engine
//!
//! Deposit, withdraw and transfer as atomic state transitions.
//!
//! Each operation moves through `Validated -> Locked -> Committed` or ends
//! in `Rejected`, either before locking (validation) or after it (store
//! verdict). Nothing is persisted about the stages themselves.

mod commands;
mod deposit;
mod transfer;
mod withdraw;

#[cfg(test)]
mod tests;

use crate::coordinator::Coordinator;
use crate::domain::{AccountId, Balance, LedgerError, OperationContext};

pub use commands::*;

/// Entry point for balance operations
#[derive(Debug)]
pub struct OperationEngine {
    coordinator: Coordinator,
    fast_path_reject: bool,
}

impl OperationEngine {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            fast_path_reject: true,
        }
    }

    /// Enable or disable rejecting withdrawals from the cached balance
    pub fn with_fast_path_reject(mut self, enabled: bool) -> Self {
        self.fast_path_reject = enabled;
        self
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Current balance, from the cache when present, otherwise from the store
    pub async fn get_balance(
        &self,
        account_id: AccountId,
        ctx: &OperationContext,
    ) -> Result<Balance, LedgerError> {
        self.coordinator.read_balance(ctx, account_id).await
    }
}
