//! Ledger Store Errors
//!
//! Error types for durable balance operations.

use crate::domain::{AccountId, LedgerError};

/// Errors that can occur in a ledger store
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Account was never created
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Conditional debit refused; nothing was written
    #[error("Insufficient funds on account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: AccountId,
        requested: i64,
        available: i64,
    },

    /// Transfer with identical sender and receiver
    #[error("Sender and receiver are the same account")]
    SameAccount,

    /// Credit would overflow the stored balance
    #[error("Balance overflow on account {0}")]
    Overflow(AccountId),

    /// Fault that left no trace (rolled back or never started); safe to retry
    #[error("Transient store fault: {0}")]
    Transient(String),

    /// The commit may or may not have reached durable storage
    #[error("Store outcome indeterminate: {0}")]
    Indeterminate(String),

    /// Permanent backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Check if the write outcome is unknown
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, StoreError::Indeterminate(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(account_id) => LedgerError::AccountNotFound(account_id),
            StoreError::InsufficientFunds {
                account_id,
                requested,
                available,
            } => LedgerError::insufficient_funds(account_id, requested, available),
            StoreError::SameAccount => LedgerError::SameAccount,
            StoreError::Overflow(account_id) => LedgerError::BalanceOverflow(account_id),
            StoreError::Transient(msg) => LedgerError::Unavailable(msg),
            StoreError::Backend(msg) => LedgerError::Backend(msg),
            StoreError::Indeterminate(msg) => LedgerError::Unknown(msg),
        }
    }
}
