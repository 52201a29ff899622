//! Command definitions
//!
//! Commands represent intentions to change a balance. Amounts arrive raw
//! and are validated by the engine before any lock is taken.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Amount, Balance};

// =========================================================================
// Deposit
// =========================================================================

/// Command to credit an account, creating it if needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account_id: AccountId,
    /// Amount in minor units
    pub amount: i64,
}

impl DepositCommand {
    pub fn new(account_id: impl Into<AccountId>, amount: i64) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
        }
    }
}

// =========================================================================
// Withdraw
// =========================================================================

/// Command to debit an existing account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawCommand {
    pub account_id: AccountId,
    /// Amount in minor units
    pub amount: i64,
}

impl WithdrawCommand {
    pub fn new(account_id: impl Into<AccountId>, amount: i64) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
        }
    }
}

// =========================================================================
// Transfer
// =========================================================================

/// Command to move funds between two existing accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommand {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    /// Amount in minor units
    pub amount: i64,
}

impl TransferCommand {
    pub fn new(sender_id: impl Into<AccountId>, receiver_id: impl Into<AccountId>, amount: i64) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            amount,
        }
    }
}

/// Result of a successful deposit or withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub new_balance: Balance,
}

/// Result of a successful transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Amount,
    pub sender_balance: Balance,
    pub receiver_balance: Balance,
}
