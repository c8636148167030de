use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    audit::{AuditAction, EntityType},
    auth::{Access, Principal},
    bank::{CurrencyOperation, OperationKind},
    command::positive_amount,
    error::LedgerResult,
};

use super::Ledger;

impl Ledger {
    /// Adds `amount` to the total supply. Minted currency lands in the free
    /// pool, no wallet balance changes.
    pub fn mint(
        &self,
        principal: &Principal,
        amount: Decimal,
        reason: &str,
    ) -> LedgerResult<CurrencyOperation> {
        principal.require(Access::Admin, "mint currency")?;
        self.adjust_supply(principal, OperationKind::Mint, amount, reason)
    }

    /// Removes `amount` from the free pool. Fails if it is larger than the free
    /// pool at this instant.
    pub fn burn(
        &self,
        principal: &Principal,
        amount: Decimal,
        reason: &str,
    ) -> LedgerResult<CurrencyOperation> {
        principal.require(Access::Admin, "burn currency")?;
        self.adjust_supply(principal, OperationKind::Burn, amount, reason)
    }

    fn adjust_supply(
        &self,
        principal: &Principal,
        kind: OperationKind,
        amount: Decimal,
        reason: &str,
    ) -> LedgerResult<CurrencyOperation> {
        let amount = positive_amount("amount", amount)?;
        let (operation, total_supply) = self
            .store
            .write(|uow| {
                let mut pool = uow.pool()?;
                match kind {
                    OperationKind::Mint => pool.mint(amount)?,
                    OperationKind::Burn => pool.burn(amount)?,
                }
                let operation =
                    CurrencyOperation::new(kind, amount, reason.to_string(), principal.actor);
                let action = match kind {
                    OperationKind::Mint => AuditAction::CurrencyMinted,
                    OperationKind::Burn => AuditAction::CurrencyBurned,
                };
                uow.audit(
                    action,
                    EntityType::Bank,
                    pool.id,
                    principal.actor,
                    json!({
                        "operation_id": operation.id,
                        "amount": amount,
                        "reason": reason,
                        "new_total_supply": pool.total_supply(),
                    }),
                )?;
                let total_supply = pool.total_supply();
                uow.put_pool(pool);
                uow.push_currency_operation(operation.clone());
                Ok((operation, total_supply))
            })
            .inspect_err(|err| warn!(%kind, %amount, %err, "currency operation rejected"))?;

        info!(%kind, %amount, %total_supply, "currency supply adjusted");
        Ok(operation)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        bank::PoolError,
        error::{ErrorKind, InvariantViolation, LedgerError},
        processor::tests::test_ledger,
    };

    #[test]
    fn mint_then_burn() {
        let (ledger, admin) = test_ledger(1000);
        let op = ledger.mint(&admin, Decimal::from(500), "festival").unwrap();
        assert_eq!(op.kind, OperationKind::Mint);
        assert_eq!(ledger.pool(&admin).unwrap().total_supply, Decimal::from(1500));

        let op = ledger.burn(&admin, Decimal::from(1500), "reset").unwrap();
        assert_eq!(op.supply_delta(), Decimal::from(-1500));
        assert_eq!(ledger.pool(&admin).unwrap().total_supply, Decimal::ZERO);

        let ops = ledger.currency_operations(&admin, Default::default()).unwrap();
        assert_eq!(ops.total, 2);
    }

    #[test]
    fn burn_limited_by_free_pool() {
        let (ledger, admin) = test_ledger(10);
        let err = ledger.burn(&admin, Decimal::new(1001, 2), "").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Pool(PoolError::BurnExceedsFreePool { .. }))
        ));
        assert_eq!(ledger.pool(&admin).unwrap().total_supply, Decimal::from(10));
        let ops = ledger.currency_operations(&admin, Default::default()).unwrap();
        assert_eq!(ops.total, 0);
    }

    #[test]
    fn amounts_must_be_positive() {
        let (ledger, admin) = test_ledger(10);
        for amount in [Decimal::ZERO, Decimal::from(-3)] {
            assert_eq!(
                ledger.mint(&admin, amount, "").unwrap_err().kind(),
                ErrorKind::Validation
            );
            assert_eq!(
                ledger.burn(&admin, amount, "").unwrap_err().kind(),
                ErrorKind::Validation
            );
        }
    }

    #[test]
    fn only_admin_adjusts_supply() {
        let (ledger, _) = test_ledger(10);
        let user = Principal::user(Uuid::new_v4());
        assert_eq!(
            ledger.mint(&user, Decimal::ONE, "").unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }
}
