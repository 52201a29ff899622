//! API Routes
//!
//! HTTP endpoint definitions.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, OperationContext};
use crate::engine::{
    BalanceChange, DepositCommand, OperationEngine, TransferCommand, TransferResult,
    WithdrawCommand,
};
use crate::error::AppError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<OperationEngine>,
    /// Deadline applied to each request's operation
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(engine: Arc<OperationEngine>, request_timeout: Duration) -> Self {
        Self {
            engine,
            request_timeout,
        }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub account_id: i64,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceChangeResponse {
    pub account_id: i64,
    pub new_balance: i64,
}

impl From<BalanceChange> for BalanceChangeResponse {
    fn from(change: BalanceChange) -> Self {
        Self {
            account_id: change.account_id.value(),
            new_balance: change.new_balance.value(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub amount: i64,
    pub sender_balance: i64,
    pub receiver_balance: i64,
}

impl From<TransferResult> for TransferResponse {
    fn from(result: TransferResult) -> Self {
        Self {
            sender_id: result.sender_id.value(),
            receiver_id: result.receiver_id.value(),
            amount: result.amount.value(),
            sender_balance: result.sender_balance.value(),
            receiver_balance: result.receiver_balance.value(),
        }
    }
}

/// Legacy body for `/add` and `/withdraw`
#[derive(Debug, Serialize, Deserialize)]
pub struct LegacyMoneyRequest {
    pub user: i64,
    pub money: i64,
}

/// Legacy body for `/send`
#[derive(Debug, Serialize, Deserialize)]
pub struct LegacySendRequest {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub money: i64,
}

#[derive(Debug, Deserialize)]
pub struct LegacyBalanceQuery {
    pub id: i64,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/accounts/:account_id/balance", get(get_balance))
        .route("/deposit", post(deposit))
        .route("/withdraw", post(withdraw))
        .route("/transfer", post(transfer))
}

/// Pre-v1 endpoints kept for existing clients
pub fn legacy_router() -> Router<AppState> {
    Router::new()
        .route("/get", get(get_balance_legacy))
        .route("/add", post(deposit_legacy))
        .route("/withdraw", post(withdraw_legacy))
        .route("/send", post(send_legacy))
}

// =========================================================================
// GET /accounts/:account_id/balance
// =========================================================================

async fn get_balance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<i64>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state
        .engine
        .get_balance(AccountId::new(account_id), &context)
        .await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance: balance.value(),
    }))
}

// =========================================================================
// POST /deposit, /withdraw
// =========================================================================

async fn deposit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<BalanceChangeResponse>, AppError> {
    let Json(request) = payload?;

    let change = state
        .engine
        .deposit(DepositCommand::new(request.account_id, request.amount), &context)
        .await?;

    Ok(Json(change.into()))
}

async fn withdraw(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<BalanceChangeResponse>, AppError> {
    let Json(request) = payload?;

    let change = state
        .engine
        .withdraw(WithdrawCommand::new(request.account_id, request.amount), &context)
        .await?;

    Ok(Json(change.into()))
}

// =========================================================================
// POST /transfer
// =========================================================================

async fn transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransferResponse>, AppError> {
    let Json(request) = payload?;

    let command = TransferCommand::new(request.sender_id, request.receiver_id, request.amount);
    let result = state.engine.transfer(command, &context).await?;

    Ok(Json(result.into()))
}

// =========================================================================
// Legacy endpoints
// =========================================================================

/// Plain-text balance by query parameter (legacy)
async fn get_balance_legacy(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    query: Result<Query<LegacyBalanceQuery>, QueryRejection>,
) -> Result<String, AppError> {
    let Query(query) = query?;

    let balance = state
        .engine
        .get_balance(AccountId::new(query.id), &context)
        .await?;

    Ok(balance.to_string())
}

async fn deposit_legacy(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<LegacyMoneyRequest>, JsonRejection>,
) -> Result<Json<LegacyMoneyRequest>, AppError> {
    let Json(request) = payload?;

    let change = state
        .engine
        .deposit(DepositCommand::new(request.user, request.money), &context)
        .await?;

    Ok(Json(LegacyMoneyRequest {
        user: change.account_id.value(),
        money: change.new_balance.value(),
    }))
}

async fn withdraw_legacy(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<LegacyMoneyRequest>, JsonRejection>,
) -> Result<Json<LegacyMoneyRequest>, AppError> {
    let Json(request) = payload?;

    let change = state
        .engine
        .withdraw(WithdrawCommand::new(request.user, request.money), &context)
        .await?;

    Ok(Json(LegacyMoneyRequest {
        user: change.account_id.value(),
        money: change.new_balance.value(),
    }))
}

async fn send_legacy(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<LegacySendRequest>, JsonRejection>,
) -> Result<Json<TransferResponse>, AppError> {
    let Json(request) = payload?;

    let command = TransferCommand::new(request.sender_id, request.receiver_id, request.money);
    let result = state.engine.transfer(command, &context).await?;

    Ok(Json(result.into()))
}
