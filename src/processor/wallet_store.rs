use rust_decimal::{Decimal, prelude::Zero};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    audit::{AuditAction, EntityType},
    auth::{Access, Principal},
    command::non_negative_amount,
    error::LedgerResult,
    store::UnitOfWork,
    wallet::{OwnerId, Wallet, WalletEvent, WalletId, WalletStatus},
};

use super::Ledger;

pub const DEFAULT_WALLET_NAME: &str = "Default Wallet";

#[derive(Debug, Clone, Deserialize)]
pub struct NewWallet {
    pub owner: OwnerId,
    /// Falls back to the bank rule's `default_wallet_balance`.
    #[serde(default)]
    pub initial_balance: Option<Decimal>,
    #[serde(default)]
    pub name: Option<String>,
}

impl NewWallet {
    pub fn for_owner(owner: OwnerId) -> Self {
        Self {
            owner,
            initial_balance: None,
            name: None,
        }
    }

    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.initial_balance = Some(balance);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Applies `event` to `wallet` and moves the pool's circulation along with it,
/// so the two are never staged apart.
pub(crate) fn apply_wallet_event(
    uow: &mut UnitOfWork<'_>,
    wallet: &mut Wallet,
    event: &WalletEvent,
) -> LedgerResult<()> {
    let delta = event.circulation_delta();
    if !delta.is_zero() {
        let mut pool = uow.pool()?;
        pool.adjust_circulation(delta)?;
        uow.put_pool(pool);
    }
    wallet.apply(event);
    Ok(())
}

impl Ledger {
    pub fn create_wallet(&self, principal: &Principal, new: NewWallet) -> LedgerResult<Wallet> {
        principal.require(Access::Admin, "create wallet")?;
        if let Some(balance) = new.initial_balance {
            non_negative_amount("initial_balance", balance)?;
        }
        let name = new
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_WALLET_NAME.to_string());

        let wallet = self
            .store
            .write(|uow| {
                let rule = uow.rule()?;
                let balance = new.initial_balance.unwrap_or(rule.default_wallet_balance);
                let mut pool = uow.pool()?;
                pool.adjust_circulation(balance)?;
                uow.put_pool(pool);

                let wallet = Wallet::open(new.owner, name, balance);
                uow.audit(
                    AuditAction::WalletCreated,
                    EntityType::Wallet,
                    wallet.id,
                    principal.actor,
                    json!({
                        "owner": wallet.owner,
                        "name": wallet.name,
                        "initial_balance": balance,
                    }),
                )?;
                uow.put_wallet(wallet.clone());
                Ok(wallet)
            })
            .inspect_err(|err| warn!(owner = %new.owner, %err, "wallet creation rejected"))?;

        info!(
            wallet = %wallet.id,
            owner = %wallet.owner,
            balance = %wallet.balance(),
            "wallet created"
        );
        Ok(wallet)
    }

    /// Moves a wallet between `active` and `frozen`, or burns it. Burning
    /// takes the wallet's balance out of circulation and is final.
    pub fn set_wallet_status(
        &self,
        principal: &Principal,
        id: WalletId,
        status: WalletStatus,
        reason: &str,
    ) -> LedgerResult<Wallet> {
        principal.require(Access::Admin, "update wallet status")?;
        let wallet = self
            .store
            .write(|uow| {
                let mut wallet = uow.wallet(&id)?;
                let old_status = wallet.status();
                let event = wallet.handle_status_change(status)?;
                let released = event.circulation_delta().abs();
                apply_wallet_event(uow, &mut wallet, &event)?;
                uow.audit(
                    AuditAction::WalletStatusUpdated,
                    EntityType::Wallet,
                    id,
                    principal.actor,
                    json!({
                        "old_status": old_status,
                        "new_status": status,
                        "released": released,
                        "reason": reason,
                    }),
                )?;
                uow.put_wallet(wallet.clone());
                Ok(wallet)
            })
            .inspect_err(|err| {
                warn!(wallet = %id, %status, %err, "wallet status change rejected")
            })?;

        info!(wallet = %id, %status, "wallet status updated");
        Ok(wallet)
    }

    /// Admin override of a wallet balance.
    ///
    /// Skips every transfer check, `transaction_limit` included. Only the pool
    /// invariant still applies: the new circulation must fit in total supply.
    pub fn reset_wallet_balance(
        &self,
        principal: &Principal,
        id: WalletId,
        new_balance: Decimal,
        reason: &str,
    ) -> LedgerResult<Wallet> {
        principal.require(Access::Admin, "reset wallet balance")?;
        non_negative_amount("new_balance", new_balance)?;
        let wallet = self
            .store
            .write(|uow| {
                let mut wallet = uow.wallet(&id)?;
                let old_balance = wallet.balance();
                let event = wallet.handle_balance_reset(new_balance)?;
                apply_wallet_event(uow, &mut wallet, &event)?;
                uow.audit(
                    AuditAction::WalletBalanceReset,
                    EntityType::Wallet,
                    id,
                    principal.actor,
                    json!({
                        "old_balance": old_balance,
                        "new_balance": new_balance,
                        "reason": reason,
                    }),
                )?;
                uow.put_wallet(wallet.clone());
                Ok(wallet)
            })
            .inspect_err(|err| warn!(wallet = %id, %err, "wallet balance reset rejected"))?;

        info!(wallet = %id, balance = %new_balance, "wallet balance reset");
        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        bank::{PoolError, RuleUpdate},
        error::{ErrorKind, InvariantViolation, LedgerError},
        processor::tests::test_ledger,
        wallet::WalletError,
    };

    #[test]
    fn create_wallet_moves_circulation() {
        let (ledger, admin) = test_ledger(100);
        let wallet = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::from(30)),
            )
            .unwrap();
        assert_eq!(wallet.name, DEFAULT_WALLET_NAME);
        assert_eq!(wallet.status(), WalletStatus::Active);

        let pool = ledger.pool(&admin).unwrap();
        assert_eq!(pool.in_circulation, Decimal::from(30));
        assert_eq!(pool.free_pool, Decimal::from(70));
    }

    #[test]
    fn create_wallet_uses_rule_default_balance() {
        let (ledger, admin) = test_ledger(100);
        ledger
            .set_rule(
                &admin,
                RuleUpdate {
                    default_wallet_balance: Decimal::from(15),
                    ..Default::default()
                },
            )
            .unwrap();
        let wallet = ledger
            .create_wallet(&admin, NewWallet::for_owner(Uuid::new_v4()).named("Savings"))
            .unwrap();
        assert_eq!(wallet.balance(), Decimal::from(15));
        assert_eq!(wallet.name, "Savings");
    }

    #[test]
    fn create_wallet_cannot_exceed_supply() {
        let (ledger, admin) = test_ledger(10);
        let err = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::from(11)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Pool(
                PoolError::CirculationExceedsSupply { .. }
            ))
        ));
        assert_eq!(ledger.pool(&admin).unwrap().in_circulation, Decimal::zero());
    }

    #[test]
    fn oversized_balances_are_rejected() {
        let (ledger, admin) = test_ledger(100);
        let wallet = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::from(10)),
            )
            .unwrap();

        let err = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::MAX),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        let err = ledger
            .reset_wallet_balance(&admin, wallet.id, Decimal::MAX, "typo")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Pool(
                PoolError::CirculationExceedsSupply { .. }
            ))
        ));
        assert_eq!(ledger.pool(&admin).unwrap().in_circulation, Decimal::from(10));
    }

    #[test]
    fn create_wallet_requires_bank_and_admin() {
        let ledger = Ledger::new();
        let admin = Principal::admin(Uuid::new_v4());
        let err = ledger
            .create_wallet(&admin, NewWallet::for_owner(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let user = Principal::user(Uuid::new_v4());
        let err = ledger
            .create_wallet(&user, NewWallet::for_owner(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn burn_wallet_once() {
        let (ledger, admin) = test_ledger(100);
        let wallet = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::from(40)),
            )
            .unwrap();

        ledger
            .set_wallet_status(&admin, wallet.id, WalletStatus::Frozen, "audit")
            .unwrap();
        assert_eq!(ledger.pool(&admin).unwrap().in_circulation, Decimal::from(40));

        ledger
            .set_wallet_status(&admin, wallet.id, WalletStatus::Burned, "left")
            .unwrap();
        assert_eq!(ledger.pool(&admin).unwrap().in_circulation, Decimal::zero());

        let err = ledger
            .set_wallet_status(&admin, wallet.id, WalletStatus::Burned, "again")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Wallet(WalletError::Burned { .. }))
        ));
        assert_eq!(ledger.pool(&admin).unwrap().in_circulation, Decimal::zero());
    }

    #[test]
    fn reset_balance_adjusts_circulation() {
        let (ledger, admin) = test_ledger(100);
        let wallet = ledger
            .create_wallet(
                &admin,
                NewWallet::for_owner(Uuid::new_v4()).with_balance(Decimal::from(40)),
            )
            .unwrap();
        let wallet = ledger
            .reset_wallet_balance(&admin, wallet.id, Decimal::new(1250, 2), "correction")
            .unwrap();
        assert_eq!(wallet.balance(), Decimal::new(1250, 2));
        assert_eq!(
            ledger.pool(&admin).unwrap().in_circulation,
            Decimal::new(1250, 2)
        );

        let err = ledger
            .reset_wallet_balance(&admin, wallet.id, Decimal::from(101), "too much")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        let err = ledger
            .reset_wallet_balance(&admin, wallet.id, Decimal::from(-1), "negative")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
