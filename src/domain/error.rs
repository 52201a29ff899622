//! Domain Error Types
//!
//! The failure taxonomy every ledger operation reports through.

use thiserror::Error;

use super::{AccountId, AmountError};

/// Ledger operation failures.
///
/// Every operation either commits fully or fails with exactly one of these.
/// `Unknown` is deliberately distinct from both success and failure: the
/// caller must not blindly retry a write that may already have landed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero, negative, or above the accepted maximum
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Account was never created
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Debit would take the balance below zero
    #[error("Insufficient funds on account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: AccountId,
        requested: i64,
        available: i64,
    },

    /// Transfer with identical sender and receiver
    #[error("Cannot transfer to the same account")]
    SameAccount,

    /// Credit would overflow the stored balance
    #[error("Balance overflow on account {0}")]
    BalanceOverflow(AccountId),

    /// Transient backend fault that outlived the retry budget; nothing was applied
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// The write may or may not have been applied
    #[error("Outcome unknown: {0}")]
    Unknown(String),

    /// Permanent backend failure; nothing was applied and retrying will not help
    #[error("Ledger backend failure: {0}")]
    Backend(String),
}

impl LedgerError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(account_id: AccountId, requested: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            account_id,
            requested,
            available,
        }
    }

    /// Check if this is a definitive business rejection (caller's fault)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::AccountNotFound(_)
                | Self::InsufficientFunds { .. }
                | Self::SameAccount
                | Self::BalanceOverflow(_)
        )
    }

    /// Check if a later attempt may succeed without changing the request
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Check if the write outcome could not be determined
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}
