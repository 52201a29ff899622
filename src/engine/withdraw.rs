//! Withdraw

use super::{BalanceChange, OperationEngine, WithdrawCommand};
use crate::domain::{Amount, LedgerError, OperationContext};

impl OperationEngine {
    /// Debit an existing account.
    ///
    /// A cached balance that is already too small rejects the request before
    /// any lock is taken. Otherwise the store's conditional debit decides.
    pub async fn withdraw(
        &self,
        command: WithdrawCommand,
        ctx: &OperationContext,
    ) -> Result<BalanceChange, LedgerError> {
        let account_id = command.account_id;
        let amount = Amount::new(command.amount)?;

        if self.fast_path_reject {
            if let Some(cached) = self.coordinator.cached_balance(account_id) {
                if !cached.is_sufficient_for(&amount) {
                    tracing::debug!(
                        account_id = %account_id,
                        amount = amount.value(),
                        cached = cached.value(),
                        "Withdrawal rejected from cached balance"
                    );
                    return Err(LedgerError::insufficient_funds(
                        account_id,
                        amount.value(),
                        cached.value(),
                    ));
                }
            }
        }

        let locked = self.coordinator.lock(ctx, &[account_id]).await?;

        let outcome = locked.apply_delta(account_id, amount.as_debit()).await;
        match outcome {
            Ok(new_balance) => {
                locked.record(account_id, new_balance);
                drop(locked);

                tracing::info!(
                    account_id = %account_id,
                    amount = amount.value(),
                    new_balance = new_balance.value(),
                    correlation_id = ?ctx.correlation_id,
                    "Withdrawal committed"
                );

                Ok(BalanceChange {
                    account_id,
                    new_balance,
                })
            }
            Err(err @ LedgerError::InsufficientFunds { .. }) => {
                // The fast path may have passed on a stale entry; correct it
                if let Err(refresh_err) = locked.refresh(account_id).await {
                    tracing::warn!(
                        account_id = %account_id,
                        error = %refresh_err,
                        "Cache refresh after rejected withdrawal failed"
                    );
                }
                tracing::info!(
                    account_id = %account_id,
                    amount = amount.value(),
                    correlation_id = ?ctx.correlation_id,
                    "Withdrawal rejected: insufficient funds"
                );
                Err(err)
            }
            Err(err) => {
                tracing::warn!(
                    account_id = %account_id,
                    amount = amount.value(),
                    error = %err,
                    correlation_id = ?ctx.correlation_id,
                    "Withdrawal failed"
                );
                Err(err)
            }
        }
    }
}
