use serde_json::json;
use tracing::{info, warn};

use crate::{
    audit::{AuditAction, EntityType},
    auth::{Access, Principal},
    bank::{BankPool, BankRule, BankSetup, PoolSnapshot, RuleUpdate},
    error::{ConflictError, EntityKind, LedgerError, LedgerResult},
};

use super::Ledger;

impl Ledger {
    /// One-time initialization of the currency pool and its default rule.
    /// Retrying after success fails with a conflict and changes nothing.
    pub fn setup(&self, principal: &Principal, setup: BankSetup) -> LedgerResult<BankPool> {
        principal.require(Access::Admin, "set up bank")?;
        setup.validate()?;
        let pool = self
            .store
            .write(|uow| {
                if uow.has_pool() {
                    return Err(ConflictError::BankAlreadySetUp.into());
                }
                let pool = BankPool::new(setup);
                let rule = BankRule::default_for(pool.id);
                uow.audit(
                    AuditAction::BankSetup,
                    EntityType::Bank,
                    pool.id,
                    principal.actor,
                    json!({
                        "bank_name": pool.bank_name,
                        "currency_name": pool.currency_name,
                        "currency_symbol": pool.currency_symbol,
                        "initial_supply": pool.total_supply(),
                    }),
                )?;
                uow.put_pool(pool.clone());
                uow.put_rule(rule);
                Ok(pool)
            })
            .inspect_err(|err| warn!(%err, "bank setup rejected"))?;

        info!(bank = %pool.id, supply = %pool.total_supply(), "bank set up");
        Ok(pool)
    }

    pub fn rule(&self, principal: &Principal) -> LedgerResult<BankRule> {
        principal.require(Access::Anyone, "read bank rule")?;
        self.store.read(|state| {
            state
                .rule
                .clone()
                .ok_or_else(|| LedgerError::not_found(EntityKind::Bank, "rule"))
        })
    }

    /// Replaces the whole rule record, fields missing from `update` reset to
    /// their defaults.
    pub fn set_rule(&self, principal: &Principal, update: RuleUpdate) -> LedgerResult<BankRule> {
        principal.require(Access::Admin, "update bank rules")?;
        update.validate()?;
        let rule = self
            .store
            .write(|uow| {
                let mut rule = uow.rule()?;
                rule.replace(update);
                uow.audit(
                    AuditAction::BankRulesUpdated,
                    EntityType::BankRule,
                    rule.id,
                    principal.actor,
                    json!({
                        "transaction_limit": rule.transaction_limit,
                        "require_approval": rule.require_approval,
                        "allow_refunds": rule.allow_refunds,
                        "default_wallet_balance": rule.default_wallet_balance,
                    }),
                )?;
                uow.put_rule(rule.clone());
                Ok(rule)
            })
            .inspect_err(|err| warn!(%err, "bank rule update rejected"))?;

        info!(
            limit = ?rule.transaction_limit,
            require_approval = rule.require_approval,
            allow_refunds = rule.allow_refunds,
            "bank rules updated"
        );
        Ok(rule)
    }

    pub fn pool(&self, principal: &Principal) -> LedgerResult<PoolSnapshot> {
        principal.require(Access::Anyone, "read currency pool")?;
        self.store.read(|state| {
            state
                .pool
                .as_ref()
                .map(BankPool::snapshot)
                .ok_or_else(|| LedgerError::not_found(EntityKind::Bank, "pool"))
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::{command::ValidationError, error::ErrorKind, processor::tests::test_ledger};

    #[test]
    fn setup_only_once() {
        let (ledger, admin) = test_ledger(1000);
        let err = ledger
            .setup(
                &admin,
                BankSetup {
                    bank_name: "Other".to_string(),
                    currency_name: "Bucks".to_string(),
                    currency_symbol: "B".to_string(),
                    initial_supply: Decimal::from(5),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Conflict(ConflictError::BankAlreadySetUp)
        ));

        let pool = ledger.pool(&admin).unwrap();
        assert_eq!(pool.total_supply, Decimal::from(1000));
        assert_eq!(pool.currency_name, "Coin");
        assert_eq!(ledger.audit_log(&admin, Default::default()).unwrap().total, 1);
    }

    #[test]
    fn setup_validates_before_anything_else() {
        let ledger = Ledger::new();
        let admin = Principal::admin(Uuid::new_v4());
        let err = ledger
            .setup(
                &admin,
                BankSetup {
                    bank_name: "Guild".to_string(),
                    currency_name: "Coin".to_string(),
                    currency_symbol: "C".to_string(),
                    initial_supply: Decimal::from(-1),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::NegativeAmount { .. })
        ));
        assert_eq!(ledger.pool(&admin).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn default_rule_after_setup() {
        let (ledger, admin) = test_ledger(1000);
        let rule = ledger.rule(&Principal::guest(Uuid::new_v4())).unwrap();
        assert_eq!(rule.transaction_limit, None);
        assert!(!rule.require_approval);
        assert!(rule.allow_refunds);
        assert_eq!(rule.default_wallet_balance, Decimal::ZERO);

        let rule = ledger
            .set_rule(
                &admin,
                RuleUpdate {
                    require_approval: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(rule.require_approval);
    }

    #[test]
    fn only_admin_changes_rules() {
        let (ledger, _) = test_ledger(1000);
        let err = ledger
            .set_rule(&Principal::user(Uuid::new_v4()), RuleUpdate::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
