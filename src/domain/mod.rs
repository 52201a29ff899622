//! Domain module
//!
//! Core domain types and the ledger failure taxonomy.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;

pub use account::AccountId;
pub use amount::{Amount, AmountError, Balance, MAX_AMOUNT};
pub use context::OperationContext;
pub use error::LedgerError;
