//! Deposit

use super::{BalanceChange, DepositCommand, OperationEngine};
use crate::domain::{Amount, LedgerError, OperationContext};

impl OperationEngine {
    /// Credit an account, creating it at zero first when it does not exist
    pub async fn deposit(
        &self,
        command: DepositCommand,
        ctx: &OperationContext,
    ) -> Result<BalanceChange, LedgerError> {
        let account_id = command.account_id;
        let amount = Amount::new(command.amount)?;

        let locked = self.coordinator.lock(ctx, &[account_id]).await?;

        let new_balance = match locked.apply_delta(account_id, amount.as_credit()).await {
            Ok(balance) => balance,
            Err(err) if err.is_unknown() => {
                // Not idempotent: the caller has to reconcile before resubmitting
                tracing::error!(
                    account_id = %account_id,
                    amount = amount.value(),
                    error = %err,
                    correlation_id = ?ctx.correlation_id,
                    "Deposit outcome unknown"
                );
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    account_id = %account_id,
                    amount = amount.value(),
                    error = %err,
                    correlation_id = ?ctx.correlation_id,
                    "Deposit failed"
                );
                return Err(err);
            }
        };
        locked.record(account_id, new_balance);
        drop(locked);

        tracing::info!(
            account_id = %account_id,
            amount = amount.value(),
            new_balance = new_balance.value(),
            correlation_id = ?ctx.correlation_id,
            "Deposit committed"
        );

        Ok(BalanceChange {
            account_id,
            new_balance,
        })
    }
}
