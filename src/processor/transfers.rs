use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditAction, EntityType},
    auth::{Access, ActorId, Principal},
    command::{TransferCommand, TransferRequest},
    error::LedgerResult,
    store::UnitOfWork,
    transaction::{Transaction, TransactionId, TransactionStatus, TransitionError},
    wallet::{Movement, WalletId},
};

use super::{Ledger, TransactionProcessor, wallet_store::apply_wallet_event};

/// Debits `from` and credits `to` inside `uow`.
///
/// `to` is read after `from` has been staged, so a wallet paying itself ends
/// up where it started.
fn move_balance(
    uow: &mut UnitOfWork<'_>,
    from: &WalletId,
    to: &WalletId,
    amount: Decimal,
    movement: Movement,
) -> LedgerResult<()> {
    let mut source = uow.wallet(from)?;
    let debit = source.handle_debit(amount, movement)?;
    apply_wallet_event(uow, &mut source, &debit)?;
    uow.put_wallet(source);

    let mut target = uow.wallet(to)?;
    let credit = target.handle_credit(amount, movement)?;
    apply_wallet_event(uow, &mut target, &credit)?;
    uow.put_wallet(target);
    Ok(())
}

/// Reverses a complete transaction. Only reachable through an approved
/// refund request.
pub(crate) fn refund_transaction(
    uow: &mut UnitOfWork<'_>,
    id: &TransactionId,
    actor: ActorId,
    reason: &str,
) -> LedgerResult<Transaction> {
    let mut tx = uow.transaction(id)?;
    if tx.status() != TransactionStatus::Complete {
        return Err(TransitionError::NotRefundable {
            transaction: tx.id,
            status: tx.status(),
        }
        .into());
    }
    let old_status = tx.transition(TransactionStatus::Refunded)?;
    move_balance(
        uow,
        &tx.to_wallet,
        &tx.from_wallet,
        tx.amount,
        Movement::Reversal,
    )?;
    uow.audit(
        AuditAction::TransactionRefunded,
        EntityType::Transaction,
        tx.id,
        actor,
        json!({
            "old_status": old_status,
            "new_status": tx.status(),
            "amount": tx.amount,
            "reason": reason,
        }),
    )?;
    uow.put_transaction(tx.clone());
    Ok(tx)
}

impl TransactionProcessor for Ledger {
    fn create_transaction(
        &self,
        principal: &Principal,
        request: TransferRequest,
    ) -> LedgerResult<Transaction> {
        principal.require(Access::UserOrAdmin, "create transaction")?;
        let (from, to) = (request.from_wallet_id, request.to_wallet_id);

        self.store
            .write(|uow| {
                // the key lookup and the insert share this unit of work, so a
                // concurrent retry either sees the transaction or waits for it.
                // A known key wins over whatever payload comes with it.
                if let Some(key) = request.idempotency_key() {
                    if let Some(existing) = uow.transaction_by_key(key) {
                        debug!(transaction = %existing.id, key, "idempotent replay");
                        return Ok(existing);
                    }
                }
                let command = TransferCommand::parse(request)?;

                let rule = uow.rule()?;
                let source = uow.wallet(&command.from)?;
                let target = uow.wallet(&command.to)?;
                source.handle_debit(command.amount, Movement::Settlement)?;
                target.handle_credit(command.amount, Movement::Settlement)?;
                rule.check_limit(command.amount)?;

                let status = if rule.require_approval {
                    TransactionStatus::Pending
                } else {
                    TransactionStatus::Complete
                };
                let tx = Transaction::new(
                    command.from,
                    command.to,
                    command.amount,
                    command.category,
                    command.reason.clone(),
                    command.idempotency_key.clone(),
                    status,
                );
                if status == TransactionStatus::Complete {
                    move_balance(uow, &tx.from_wallet, &tx.to_wallet, tx.amount, Movement::Settlement)?;
                }
                uow.audit(
                    AuditAction::TransactionCreated,
                    EntityType::Transaction,
                    tx.id,
                    principal.actor,
                    json!({
                        "from_wallet_id": tx.from_wallet,
                        "to_wallet_id": tx.to_wallet,
                        "amount": tx.amount,
                        "category": tx.category,
                        "status": status,
                    }),
                )?;
                uow.put_transaction(tx.clone());
                info!(
                    transaction = %tx.id,
                    from = %tx.from_wallet,
                    to = %tx.to_wallet,
                    amount = %tx.amount,
                    %status,
                    "transaction created"
                );
                Ok(tx)
            })
            .inspect_err(|err| {
                warn!(?from, ?to, %err, "transaction rejected")
            })
    }

    fn advance_transaction(
        &self,
        principal: &Principal,
        id: TransactionId,
        new_status: TransactionStatus,
        reason: &str,
    ) -> LedgerResult<Transaction> {
        principal.require(Access::Admin, "update transaction status")?;
        let tx = self
            .store
            .write(|uow| {
                let mut tx = uow.transaction(&id)?;
                tx.check_transition(new_status)?;
                if new_status == TransactionStatus::Refunded {
                    return Err(TransitionError::RefundRequiresRequest { transaction: id }.into());
                }
                let old_status = tx.transition(new_status)?;
                // settlement was deferred at creation, balances and wallet
                // status are checked again as they are now
                if new_status == TransactionStatus::Complete {
                    move_balance(uow, &tx.from_wallet, &tx.to_wallet, tx.amount, Movement::Settlement)?;
                }
                uow.audit(
                    AuditAction::TransactionStatusUpdated,
                    EntityType::Transaction,
                    id,
                    principal.actor,
                    json!({
                        "old_status": old_status,
                        "new_status": new_status,
                        "reason": reason,
                    }),
                )?;
                uow.put_transaction(tx.clone());
                Ok(tx)
            })
            .inspect_err(|err| {
                warn!(transaction = %id, %new_status, %err, "transaction update rejected")
            })?;

        info!(transaction = %id, status = %tx.status(), "transaction status updated");
        Ok(tx)
    }
}
