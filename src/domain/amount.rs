//! Amount type
//!
//! Domain primitives for monetary values in minor currency units.
//! `Amount` is what an operation moves, `Balance` is what an account holds.
//! Both are integers so no rounding drift can creep into the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum amount accepted for a single operation (10^15 minor units)
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Value never exceeds `MAX_AMOUNT`
///
/// # Example
/// ```
/// use billing_ledger::domain::Amount;
///
/// let amount = Amount::new(100).unwrap();
/// assert_eq!(amount.value(), 100);
/// assert!(Amount::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount or moving a Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    TooLarge(i64),

    #[error("Balance cannot be negative (got {0})")]
    NegativeBalance(i64),

    #[error("Balance of {balance} cannot cover {requested}")]
    Insufficient { balance: i64, requested: i64 },

    #[error("Balance overflow")]
    Overflow,
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooLarge` if value > `MAX_AMOUNT`
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value <= 0 {
            return Err(AmountError::NotPositive(value));
        }
        if value > MAX_AMOUNT {
            return Err(AmountError::TooLarge(value));
        }
        Ok(Self(value))
    }

    /// Get the underlying value in minor units.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Signed delta that credits this amount
    pub fn as_credit(&self) -> i64 {
        self.0
    }

    /// Signed delta that debits this amount
    pub fn as_debit(&self) -> i64 {
        -self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents an account balance (zero or positive).
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value < 0 {
            return Err(AmountError::NegativeBalance(value));
        }
        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(0)
    }

    /// Get the underlying value
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Check if balance is sufficient for withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        self.0
            .checked_add(amount.value())
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        if !self.is_sufficient_for(amount) {
            return Err(AmountError::Insufficient {
                balance: self.0,
                requested: amount.value(),
            });
        }
        Ok(Self(self.0 - amount.value()))
    }

    /// Apply a signed delta, refusing to go negative or overflow
    pub fn apply_delta(&self, delta: i64) -> Result<Balance, AmountError> {
        let next = self.0.checked_add(delta).ok_or(AmountError::Overflow)?;
        if next < 0 {
            return Err(AmountError::Insufficient {
                balance: self.0,
                requested: delta.saturating_neg(),
            });
        }
        Ok(Self(next))
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Balance {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for i64 {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}
