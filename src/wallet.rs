use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type WalletId = Uuid;
pub type OwnerId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Frozen,
    Burned,
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WalletStatus::Active => "active",
            WalletStatus::Frozen => "frozen",
            WalletStatus::Burned => "burned",
        })
    }
}

/// How a balance movement is checked against the wallet status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    /// Regular transfer settlement, both sides must be active.
    Settlement,
    /// Reversal of an earlier settlement, allowed on frozen wallets.
    Reversal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    Debited {
        amount: Decimal,
    },
    Credited {
        amount: Decimal,
    },
    BalanceReset {
        old_balance: Decimal,
        new_balance: Decimal,
    },
    StatusChanged {
        old_status: WalletStatus,
        new_status: WalletStatus,
        released: Decimal,
    },
}

impl WalletEvent {
    /// Change of the pool's `in_circulation` caused by this event.
    ///
    /// Debits and credits always come in pairs within one unit of work, so they
    /// don't move circulation on their own.
    pub fn circulation_delta(&self) -> Decimal {
        match self {
            WalletEvent::Debited { .. } | WalletEvent::Credited { .. } => Decimal::zero(),
            WalletEvent::BalanceReset {
                old_balance,
                new_balance,
            } => *new_balance - *old_balance,
            WalletEvent::StatusChanged { released, .. } => -*released,
        }
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Wallet {wallet} is {status}, only active wallets can transfer")]
    NotActive { wallet: WalletId, status: WalletStatus },
    #[error("Wallet {wallet} is burned, no further operations are allowed")]
    Burned { wallet: WalletId },
    #[error("Insufficient funds in wallet {wallet}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        wallet: WalletId,
        balance: Decimal,
        amount: Decimal,
    },
    #[error("Wallet balance must not be negative, got {balance}")]
    NegativeBalance { balance: Decimal },
}

#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: OwnerId,
    pub name: String,
    balance: Decimal,
    status: WalletStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn open(owner: OwnerId, name: String, balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            name,
            balance,
            status: WalletStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn status(&self) -> WalletStatus {
        self.status
    }

    /// Burned wallets hold no circulating currency.
    pub fn is_circulating(&self) -> bool {
        self.status != WalletStatus::Burned
    }

    pub fn apply(&mut self, event: &WalletEvent) {
        match event {
            WalletEvent::Debited { amount } => {
                self.balance -= *amount;
            }
            WalletEvent::Credited { amount } => {
                self.balance += *amount;
            }
            WalletEvent::BalanceReset { new_balance, .. } => {
                self.balance = *new_balance;
            }
            WalletEvent::StatusChanged { new_status, .. } => {
                self.status = *new_status;
            }
        }
        self.updated_at = Utc::now();
    }

    pub fn handle_debit(
        &self,
        amount: Decimal,
        movement: Movement,
    ) -> Result<WalletEvent, WalletError> {
        self.ensure_movable(movement)?;
        if self.balance >= amount {
            Ok(WalletEvent::Debited { amount })
        } else {
            Err(WalletError::InsufficientFunds {
                wallet: self.id,
                balance: self.balance,
                amount,
            })
        }
    }

    pub fn handle_credit(
        &self,
        amount: Decimal,
        movement: Movement,
    ) -> Result<WalletEvent, WalletError> {
        self.ensure_movable(movement)?;
        Ok(WalletEvent::Credited { amount })
    }

    pub fn handle_status_change(
        &self,
        new_status: WalletStatus,
    ) -> Result<WalletEvent, WalletError> {
        if self.status == WalletStatus::Burned {
            return Err(WalletError::Burned { wallet: self.id });
        }
        let released = if new_status == WalletStatus::Burned {
            self.balance
        } else {
            Decimal::zero()
        };
        Ok(WalletEvent::StatusChanged {
            old_status: self.status,
            new_status,
            released,
        })
    }

    pub fn handle_balance_reset(&self, new_balance: Decimal) -> Result<WalletEvent, WalletError> {
        if self.status == WalletStatus::Burned {
            return Err(WalletError::Burned { wallet: self.id });
        }
        if new_balance < Decimal::zero() {
            return Err(WalletError::NegativeBalance {
                balance: new_balance,
            });
        }
        Ok(WalletEvent::BalanceReset {
            old_balance: self.balance,
            new_balance,
        })
    }

    fn ensure_movable(&self, movement: Movement) -> Result<(), WalletError> {
        match (movement, self.status) {
            (_, WalletStatus::Burned) => Err(WalletError::Burned { wallet: self.id }),
            (Movement::Settlement, WalletStatus::Frozen) => Err(WalletError::NotActive {
                wallet: self.id,
                status: self.status,
            }),
            _ => Ok(()),
        }
    }
}
