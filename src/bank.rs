use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::ActorId,
    command::{ValidationError, non_blank, non_negative_amount, positive_amount},
};

pub type BankId = Uuid;
pub type RuleId = Uuid;
pub type OperationId = Uuid;

/// Identity and opening supply of the bank, given once at setup.
#[derive(Debug, Clone, Deserialize)]
pub struct BankSetup {
    pub bank_name: String,
    pub currency_name: String,
    pub currency_symbol: String,
    #[serde(default)]
    pub initial_supply: Decimal,
}

impl BankSetup {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_blank("bank_name", &self.bank_name)?;
        non_blank("currency_name", &self.currency_name)?;
        non_blank("currency_symbol", &self.currency_symbol)?;
        non_negative_amount("initial_supply", self.initial_supply)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Cannot burn {amount}, free pool is only {free_pool}")]
    BurnExceedsFreePool { amount: Decimal, free_pool: Decimal },
    #[error("Cannot put {amount} into circulation, free pool is only {free_pool}")]
    CirculationExceedsSupply { amount: Decimal, free_pool: Decimal },
    #[error("Circulation would become negative ({in_circulation})")]
    NegativeCirculation { in_circulation: Decimal },
    #[error("Total supply overflow when minting {amount}")]
    SupplyOverflow { amount: Decimal },
}

/// The single currency pool.
///
/// Only `mint`/`burn` touch `total_supply`, only `adjust_circulation` touches
/// `in_circulation`; each checks `total_supply >= in_circulation >= 0` before
/// writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct BankPool {
    pub id: BankId,
    pub bank_name: String,
    pub currency_name: String,
    pub currency_symbol: String,
    pub genesis_supply: Decimal,
    total_supply: Decimal,
    in_circulation: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankPool {
    pub fn new(setup: BankSetup) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bank_name: setup.bank_name,
            currency_name: setup.currency_name,
            currency_symbol: setup.currency_symbol,
            genesis_supply: setup.initial_supply,
            total_supply: setup.initial_supply,
            in_circulation: Decimal::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_supply(&self) -> Decimal {
        self.total_supply
    }

    pub fn in_circulation(&self) -> Decimal {
        self.in_circulation
    }

    pub fn free_pool(&self) -> Decimal {
        self.total_supply - self.in_circulation
    }

    pub fn mint(&mut self, amount: Decimal) -> Result<(), PoolError> {
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(PoolError::SupplyOverflow { amount })?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn burn(&mut self, amount: Decimal) -> Result<(), PoolError> {
        let free_pool = self.free_pool();
        if amount > free_pool {
            return Err(PoolError::BurnExceedsFreePool { amount, free_pool });
        }
        self.total_supply -= amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves currency between the free pool and the wallets.
    pub fn adjust_circulation(&mut self, delta: Decimal) -> Result<(), PoolError> {
        if delta.is_zero() {
            return Ok(());
        }
        // compared against the free pool first, so the sum below cannot overflow
        let free_pool = self.free_pool();
        if delta > free_pool {
            return Err(PoolError::CirculationExceedsSupply {
                amount: delta,
                free_pool,
            });
        }
        let in_circulation = self.in_circulation + delta;
        if in_circulation < Decimal::zero() {
            return Err(PoolError::NegativeCirculation { in_circulation });
        }
        self.in_circulation = in_circulation;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            total_supply: self.total_supply,
            in_circulation: self.in_circulation,
            free_pool: self.free_pool(),
            currency_name: self.currency_name.clone(),
            currency_symbol: self.currency_symbol.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub total_supply: Decimal,
    pub in_circulation: Decimal,
    pub free_pool: Decimal,
    pub currency_name: String,
    pub currency_symbol: String,
}

#[derive(Debug, Error)]
pub enum RuleViolation {
    #[error("Transaction of {amount} exceeds limit of {limit}")]
    LimitExceeded { amount: Decimal, limit: Decimal },
    #[error("Refunds are not allowed")]
    RefundsDisabled,
}

/// Replacement policy record. Omitted fields fall back to their defaults, the
/// previous rule is never merged in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuleUpdate {
    pub transaction_limit: Option<Decimal>,
    pub require_approval: bool,
    pub allow_refunds: bool,
    pub default_wallet_balance: Decimal,
}

impl Default for RuleUpdate {
    fn default() -> Self {
        Self {
            transaction_limit: None,
            require_approval: false,
            allow_refunds: true,
            default_wallet_balance: Decimal::zero(),
        }
    }
}

impl RuleUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(limit) = self.transaction_limit {
            positive_amount("transaction_limit", limit)?;
        }
        non_negative_amount("default_wallet_balance", self.default_wallet_balance)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BankRule {
    pub id: RuleId,
    pub bank_id: BankId,
    pub transaction_limit: Option<Decimal>,
    pub require_approval: bool,
    pub allow_refunds: bool,
    pub default_wallet_balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl BankRule {
    pub fn default_for(bank_id: BankId) -> Self {
        let defaults = RuleUpdate::default();
        Self {
            id: Uuid::new_v4(),
            bank_id,
            transaction_limit: defaults.transaction_limit,
            require_approval: defaults.require_approval,
            allow_refunds: defaults.allow_refunds,
            default_wallet_balance: defaults.default_wallet_balance,
            updated_at: Utc::now(),
        }
    }

    pub fn replace(&mut self, update: RuleUpdate) {
        self.transaction_limit = update.transaction_limit;
        self.require_approval = update.require_approval;
        self.allow_refunds = update.allow_refunds;
        self.default_wallet_balance = update.default_wallet_balance;
        self.updated_at = Utc::now();
    }

    pub fn check_limit(&self, amount: Decimal) -> Result<(), RuleViolation> {
        match self.transaction_limit {
            Some(limit) if amount > limit => Err(RuleViolation::LimitExceeded { amount, limit }),
            _ => Ok(()),
        }
    }

    pub fn check_refunds(&self) -> Result<(), RuleViolation> {
        if self.allow_refunds {
            Ok(())
        } else {
            Err(RuleViolation::RefundsDisabled)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Mint,
    Burn,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Mint => "mint",
            OperationKind::Burn => "burn",
        })
    }
}

/// One entry of the append-only mint/burn history.
#[derive(Debug, Clone, Serialize)]
pub struct CurrencyOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub amount: Decimal,
    pub reason: String,
    pub actor: ActorId,
    pub created_at: DateTime<Utc>,
}

impl CurrencyOperation {
    pub fn new(kind: OperationKind, amount: Decimal, reason: String, actor: ActorId) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            reason,
            actor,
            created_at: Utc::now(),
        }
    }

    /// Effect on `total_supply`.
    pub fn supply_delta(&self) -> Decimal {
        match self.kind {
            OperationKind::Mint => self.amount,
            OperationKind::Burn => -self.amount,
        }
    }
}
