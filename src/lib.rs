//! billing_ledger Library
//!
//! Balance ledger with per-account serialization, an advisory balance cache
//! and a thin HTTP gateway.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod domain;
pub mod engine;
pub mod jobs;
pub mod ledger;

mod error;

pub use config::Config;
pub use domain::{AccountId, Amount, AmountError, Balance, LedgerError, OperationContext};
pub use engine::OperationEngine;
pub use error::{AppError, ErrorResponse};
