//! PostgreSQL ledger
//!
//! Every call runs in its own transaction with a bounded `lock_timeout`.
//! Debits are conditional updates and transfers lock both rows with
//! `SELECT ... FOR UPDATE` in account order, so the funds check and the
//! write can never be separated by a concurrent writer. A transfer creates
//! an absent receiver at zero inside the same transaction.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{LedgerStore, StoreError, TransferBalances};
use crate::domain::{AccountId, Amount, Balance};

/// Where in the transaction an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before COMMIT was sent; the transaction is rolled back
    Statement,
    /// While COMMIT was in flight
    Commit,
}

/// Map a sqlx error onto the store taxonomy.
fn classify(err: sqlx::Error, phase: Phase, account_id: AccountId) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // serialization_failure, deadlock_detected, lock_not_available, query_canceled
            Some("40001") | Some("40P01") | Some("55P03") | Some("57014") => {
                StoreError::Transient(err.to_string())
            }
            // numeric_value_out_of_range
            Some("22003") => StoreError::Overflow(account_id),
            _ => StoreError::Backend(err.to_string()),
        },
        sqlx::Error::PoolTimedOut => StoreError::Transient(err.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => match phase {
            Phase::Statement => StoreError::Transient(err.to_string()),
            Phase::Commit => StoreError::Indeterminate(err.to_string()),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

fn to_balance(account_id: AccountId, raw: i64) -> Result<Balance, StoreError> {
    Balance::new(raw).map_err(|e| {
        tracing::error!(account_id = %account_id, balance = raw, "Stored balance is negative");
        StoreError::Backend(e.to_string())
    })
}

/// Ledger backed by the `wallet` table
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedger {
    /// Create a new PgLedger with a database pool
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Begin a transaction with the configured row-lock timeout
    async fn begin(&self, account_id: AccountId) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, Phase::Statement, account_id))?;

        // SET does not take bind parameters
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis().max(1)
        );
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, Phase::Statement, account_id))?;

        Ok(tx)
    }

    /// Roll back a rejected transaction. A failed rollback is logged only:
    /// the server discards the transaction when the connection drops it.
    async fn rollback(tx: Transaction<'static, Postgres>, account_id: AccountId) {
        if let Err(e) = tx.rollback().await {
            tracing::warn!(account_id = %account_id, error = %e, "Rollback failed");
        }
    }

    async fn commit(tx: Transaction<'static, Postgres>, account_id: AccountId) -> Result<(), StoreError> {
        tx.commit()
            .await
            .map_err(|e| classify(e, Phase::Commit, account_id))
    }

    async fn credit(&self, account_id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        let statement_err = |e| classify(e, Phase::Statement, account_id);
        let mut tx = self.begin(account_id).await?;

        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO wallet (account_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO UPDATE
            SET balance = wallet.balance + EXCLUDED.balance, updated_at = NOW()
            RETURNING balance
            "#,
        )
        .bind(account_id.value())
        .bind(delta)
        .fetch_one(&mut *tx)
        .await
        .map_err(statement_err)?;

        Self::commit(tx, account_id).await?;
        to_balance(account_id, balance)
    }

    async fn debit(&self, account_id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        let statement_err = |e| classify(e, Phase::Statement, account_id);
        let mut tx = self.begin(account_id).await?;

        // Conditional update: the funds check and the write are one statement
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE wallet
            SET balance = balance + $2, updated_at = NOW()
            WHERE account_id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(account_id.value())
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await
        .map_err(statement_err)?;

        if let Some(balance) = updated {
            Self::commit(tx, account_id).await?;
            return to_balance(account_id, balance);
        }

        // Nothing written; find out why
        let current: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM wallet WHERE account_id = $1")
                .bind(account_id.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(statement_err)?;
        Self::rollback(tx, account_id).await;

        match current {
            None => Err(StoreError::NotFound(account_id)),
            Some(available) => Err(StoreError::InsufficientFunds {
                account_id,
                requested: delta.saturating_neg(),
                available,
            }),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Balance, StoreError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM wallet WHERE account_id = $1")
                .bind(account_id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| classify(e, Phase::Statement, account_id))?;

        match balance {
            Some(raw) => to_balance(account_id, raw),
            None => Err(StoreError::NotFound(account_id)),
        }
    }

    async fn apply_delta(&self, account_id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        if delta > 0 {
            self.credit(account_id, delta).await
        } else if delta < 0 {
            self.debit(account_id, delta).await
        } else {
            self.get_balance(account_id).await
        }
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

        let statement_err = |e| classify(e, Phase::Statement, sender);
        let mut tx = self.begin(sender).await?;

        // A transfer may be the receiver's first credit; the row only
        // survives if the transaction commits
        sqlx::query(
            r#"
            INSERT INTO wallet (account_id, balance)
            VALUES ($1, 0)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(receiver.value())
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, Phase::Statement, receiver))?;

        // Row locks in ascending account order
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT account_id, balance
            FROM wallet
            WHERE account_id = ANY($1)
            ORDER BY account_id
            FOR UPDATE
            "#,
        )
        .bind(vec![sender.value(), receiver.value()])
        .fetch_all(&mut *tx)
        .await
        .map_err(statement_err)?;

        let find = |id: AccountId| rows.iter().find(|(a, _)| *a == id.value()).map(|(_, b)| *b);
        let (sender_balance, receiver_balance) = match (find(sender), find(receiver)) {
            (Some(s), Some(r)) => (s, r),
            (None, _) => {
                Self::rollback(tx, sender).await;
                return Err(StoreError::NotFound(sender));
            }
            (_, None) => {
                Self::rollback(tx, receiver).await;
                return Err(StoreError::Backend(format!(
                    "receiver {} missing after insert",
                    receiver
                )));
            }
        };

        if sender_balance < amount.value() {
            Self::rollback(tx, sender).await;
            return Err(StoreError::InsufficientFunds {
                account_id: sender,
                requested: amount.value(),
                available: sender_balance,
            });
        }
        if receiver_balance.checked_add(amount.value()).is_none() {
            Self::rollback(tx, receiver).await;
            return Err(StoreError::Overflow(receiver));
        }

        let sender_after: i64 = sqlx::query_scalar(
            r#"
            UPDATE wallet SET balance = balance - $2, updated_at = NOW()
            WHERE account_id = $1
            RETURNING balance
            "#,
        )
        .bind(sender.value())
        .bind(amount.value())
        .fetch_one(&mut *tx)
        .await
        .map_err(statement_err)?;

        let receiver_after: i64 = sqlx::query_scalar(
            r#"
            UPDATE wallet SET balance = balance + $2, updated_at = NOW()
            WHERE account_id = $1
            RETURNING balance
            "#,
        )
        .bind(receiver.value())
        .bind(amount.value())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, Phase::Statement, receiver))?;

        Self::commit(tx, sender).await?;

        tracing::debug!(
            sender = %sender,
            receiver = %receiver,
            amount = amount.value(),
            "Transfer committed"
        );

        Ok(TransferBalances {
            sender: to_balance(sender, sender_after)?,
            receiver: to_balance(receiver, receiver_after)?,
        })
    }
}
