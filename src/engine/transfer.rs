//! Transfer

use super::{OperationEngine, TransferCommand, TransferResult};
use crate::domain::{Amount, LedgerError, OperationContext};

impl OperationEngine {
    /// Move funds between two existing accounts as one atomic unit.
    ///
    /// Both tokens are taken in ascending account order. On failure only the
    /// sender's cache entry is dropped; the receiver was not touched.
    pub async fn transfer(
        &self,
        command: TransferCommand,
        ctx: &OperationContext,
    ) -> Result<TransferResult, LedgerError> {
        let sender_id = command.sender_id;
        let receiver_id = command.receiver_id;

        let amount = Amount::new(command.amount)?;
        if sender_id == receiver_id {
            return Err(LedgerError::SameAccount);
        }

        let locked = self.coordinator.lock(ctx, &[sender_id, receiver_id]).await?;

        let balances = match locked.apply_transfer(sender_id, receiver_id, amount).await {
            Ok(balances) => balances,
            Err(err) => {
                locked.invalidate(sender_id);
                if err.is_rejection() {
                    tracing::info!(
                        sender_id = %sender_id,
                        receiver_id = %receiver_id,
                        amount = amount.value(),
                        error = %err,
                        correlation_id = ?ctx.correlation_id,
                        "Transfer rejected"
                    );
                } else {
                    tracing::warn!(
                        sender_id = %sender_id,
                        receiver_id = %receiver_id,
                        amount = amount.value(),
                        error = %err,
                        correlation_id = ?ctx.correlation_id,
                        "Transfer failed"
                    );
                }
                return Err(err);
            }
        };

        locked.record(sender_id, balances.sender);
        locked.record(receiver_id, balances.receiver);
        drop(locked);

        tracing::info!(
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            amount = amount.value(),
            sender_balance = balances.sender.value(),
            receiver_balance = balances.receiver.value(),
            correlation_id = ?ctx.correlation_id,
            "Transfer committed"
        );

        Ok(TransferResult {
            sender_id,
            receiver_id,
            amount,
            sender_balance: balances.sender,
            receiver_balance: balances.receiver,
        })
    }
}
