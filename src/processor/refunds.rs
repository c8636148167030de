use serde_json::json;
use tracing::{info, warn};

use crate::{
    audit::{AuditAction, EntityType},
    auth::{Access, Principal},
    error::{ConflictError, LedgerResult},
    refund::{Decision, RefundId, RefundRequest},
    transaction::{TransactionId, TransactionStatus, TransitionError},
};

use super::{Ledger, transfers::refund_transaction};

impl Ledger {
    /// Opens a refund request for a complete transaction. Each transaction gets
    /// at most one request, whatever became of the earlier one.
    pub fn request_refund(
        &self,
        principal: &Principal,
        transaction_id: TransactionId,
        reason: &str,
    ) -> LedgerResult<RefundRequest> {
        principal.require(Access::UserOrAdmin, "request refund")?;
        let request = self
            .store
            .write(|uow| {
                let tx = uow.transaction(&transaction_id)?;
                if tx.status() != TransactionStatus::Complete {
                    return Err(TransitionError::NotRefundable {
                        transaction: tx.id,
                        status: tx.status(),
                    }
                    .into());
                }
                uow.rule()?.check_refunds()?;
                if uow.refund_for_transaction(&transaction_id).is_some() {
                    return Err(ConflictError::RefundAlreadyRequested {
                        transaction: transaction_id,
                    }
                    .into());
                }

                let request = RefundRequest::new(transaction_id, reason.to_string());
                uow.audit(
                    AuditAction::RefundRequested,
                    EntityType::RefundRequest,
                    request.id,
                    principal.actor,
                    json!({
                        "transaction_id": transaction_id,
                        "reason": reason,
                    }),
                )?;
                uow.put_refund(request.clone());
                Ok(request)
            })
            .inspect_err(|err| {
                warn!(transaction = %transaction_id, %err, "refund request rejected")
            })?;

        info!(request = %request.id, transaction = %transaction_id, "refund requested");
        Ok(request)
    }

    /// Approves or rejects a pending refund request.
    ///
    /// Approval reverses the transaction in the same unit of work; if the
    /// reversal fails the request stays pending.
    pub fn resolve_refund(
        &self,
        principal: &Principal,
        request_id: RefundId,
        decision: Decision,
        reason: &str,
    ) -> LedgerResult<RefundRequest> {
        principal.require(Access::Admin, "resolve refund")?;
        let request = self
            .store
            .write(|uow| {
                let mut request = uow.refund(&request_id)?;
                let status = request.resolve(decision, reason.to_string())?;
                if decision == Decision::Approve {
                    refund_transaction(uow, &request.transaction_id, principal.actor, reason)?;
                }
                uow.audit(
                    AuditAction::RefundResolved,
                    EntityType::RefundRequest,
                    request.id,
                    principal.actor,
                    json!({
                        "transaction_id": request.transaction_id,
                        "status": status,
                        "reason": reason,
                    }),
                )?;
                uow.put_refund(request.clone());
                Ok(request)
            })
            .inspect_err(|err| {
                warn!(request = %request_id, ?decision, %err, "refund resolution rejected")
            })?;

        info!(request = %request.id, status = %request.status(), "refund resolved");
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::{
        bank::{RuleUpdate, RuleViolation},
        command::TransferRequest,
        error::{ErrorKind, InvariantViolation, LedgerError},
        processor::{TransactionProcessor, tests::test_ledger, wallet_store::NewWallet},
        refund::RefundStatus,
        transaction::{Category, Transaction},
        wallet::{Wallet, WalletError, WalletStatus},
    };

    fn settled_transfer() -> (Ledger, Principal, Wallet, Wallet, Transaction) {
        let (ledger, admin) = test_ledger(1000);
        let alice = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::from(100)),
            )
            .unwrap();
        let bob = ledger
            .create_wallet(&admin, NewWallet::for_owner(Uuid::new_v4()))
            .unwrap();
        let tx = ledger
            .create_transaction(
                &admin,
                TransferRequest::new(alice.id, bob.id, Decimal::new(2550, 2), Category::Trade),
            )
            .unwrap();
        (ledger, admin, alice, bob, tx)
    }

    fn balance(ledger: &Ledger, admin: &Principal, wallet: &Wallet) -> Decimal {
        ledger.wallet(admin, wallet.id).unwrap().balance()
    }

    #[test]
    fn approved_refund_reverses_exactly() {
        let (ledger, admin, alice, bob, tx) = settled_transfer();
        let user = Principal::user(Uuid::new_v4());
        let request = ledger.request_refund(&user, tx.id, "wrong wallet").unwrap();
        assert_eq!(request.status(), RefundStatus::Pending);

        let request = ledger
            .resolve_refund(&admin, request.id, Decision::Approve, "confirmed")
            .unwrap();
        assert_eq!(request.status(), RefundStatus::Approved);
        assert_eq!(balance(&ledger, &admin, &alice), Decimal::from(100));
        assert_eq!(balance(&ledger, &admin, &bob), Decimal::ZERO);
        assert_eq!(
            ledger.transaction(&admin, tx.id).unwrap().status(),
            TransactionStatus::Refunded
        );

        // neither the request nor the transaction can be refunded again
        let err = ledger
            .resolve_refund(&admin, request.id, Decision::Approve, "again")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = ledger.request_refund(&user, tx.id, "again").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Transition(
                TransitionError::NotRefundable { .. }
            ))
        ));
        assert_eq!(balance(&ledger, &admin, &alice), Decimal::from(100));
    }

    #[test]
    fn rejected_refund_is_final() {
        let (ledger, admin, alice, _, tx) = settled_transfer();
        let request = ledger.request_refund(&admin, tx.id, "please").unwrap();
        let request = ledger
            .resolve_refund(&admin, request.id, Decision::Reject, "no")
            .unwrap();
        assert_eq!(request.status(), RefundStatus::Rejected);
        assert_eq!(balance(&ledger, &admin, &alice), Decimal::new(7450, 2));

        let err = ledger.request_refund(&admin, tx.id, "please again").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Conflict(ConflictError::RefundAlreadyRequested { .. })
        ));
    }

    #[test]
    fn refunds_can_be_disabled() {
        let (ledger, admin, _, _, tx) = settled_transfer();
        ledger
            .set_rule(
                &admin,
                RuleUpdate {
                    allow_refunds: false,
                    ..Default::default()
                },
            )
            .unwrap();
        let err = ledger.request_refund(&admin, tx.id, "please").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Rule(RuleViolation::RefundsDisabled))
        ));
    }

    #[test]
    fn failed_reversal_keeps_request_pending() {
        let (ledger, admin, alice, bob, tx) = settled_transfer();
        let request = ledger.request_refund(&admin, tx.id, "please").unwrap();
        // bob spends the money before the refund is approved
        ledger
            .reset_wallet_balance(&admin, bob.id, Decimal::from(10), "spent")
            .unwrap();

        let err = ledger
            .resolve_refund(&admin, request.id, Decision::Approve, "ok")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Wallet(
                WalletError::InsufficientFunds { .. }
            ))
        ));
        let pending = ledger.pending_refunds(&admin, Default::default()).unwrap();
        assert_eq!(pending.total, 1);
        assert_eq!(pending.items[0].status(), RefundStatus::Pending);
        assert_eq!(
            ledger.transaction(&admin, tx.id).unwrap().status(),
            TransactionStatus::Complete
        );
        assert_eq!(balance(&ledger, &admin, &alice), Decimal::new(7450, 2));

        // once funds are back the same request can still be approved
        ledger
            .reset_wallet_balance(&admin, bob.id, Decimal::from(30), "returned")
            .unwrap();
        ledger
            .resolve_refund(&admin, request.id, Decision::Approve, "ok")
            .unwrap();
        assert_eq!(balance(&ledger, &admin, &alice), Decimal::from(100));
        assert_eq!(balance(&ledger, &admin, &bob), Decimal::new(450, 2));
    }

    #[test]
    fn refund_reaches_frozen_but_not_burned_wallets() {
        let (ledger, admin, alice, bob, tx) = settled_transfer();
        let request = ledger.request_refund(&admin, tx.id, "please").unwrap();
        ledger
            .set_wallet_status(&admin, alice.id, WalletStatus::Frozen, "hold")
            .unwrap();
        ledger
            .set_wallet_status(&admin, bob.id, WalletStatus::Burned, "closed")
            .unwrap();
        let err = ledger
            .resolve_refund(&admin, request.id, Decision::Approve, "ok")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Wallet(WalletError::Burned { .. }))
        ));
    }

    #[test]
    fn pending_transaction_cannot_be_refunded() {
        let (ledger, admin) = test_ledger(1000);
        ledger
            .set_rule(
                &admin,
                RuleUpdate {
                    require_approval: true,
                    ..Default::default()
                },
            )
            .unwrap();
        let alice = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::from(5)),
            )
            .unwrap();
        let tx = ledger
            .create_transaction(
                &admin,
                TransferRequest::new(alice.id, alice.id, Decimal::ONE, Category::Other),
            )
            .unwrap();
        let err = ledger.request_refund(&admin, tx.id, "early").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }
}
