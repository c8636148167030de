use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{command::ValidationError, wallet::WalletId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Reward,
    Penalty,
    Trade,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Reward => "reward",
            Category::Penalty => "penalty",
            Category::Trade => "trade",
            Category::Other => "other",
        })
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reward" => Ok(Category::Reward),
            "penalty" => Ok(Category::Penalty),
            "trade" => Ok(Category::Trade),
            "other" => Ok(Category::Other),
            other => Err(ValidationError::UnknownCategory {
                category: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Complete,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Cancelled | TransactionStatus::Refunded)
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Complete) | (Pending, Cancelled) | (Complete, Refunded)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Complete => "complete",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        })
    }
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Transaction {transaction} is already {status}")]
    Terminal {
        transaction: TransactionId,
        status: TransactionStatus,
    },
    #[error("Transaction {transaction} cannot move from {from} to {to}")]
    NotAllowed {
        transaction: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("Transaction {transaction} can only be refunded through a refund request")]
    RefundRequiresRequest { transaction: TransactionId },
    #[error("Only complete transactions can be refunded, transaction {transaction} is {status}")]
    NotRefundable {
        transaction: TransactionId,
        status: TransactionStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub from_wallet: WalletId,
    pub to_wallet: WalletId,
    pub amount: Decimal,
    pub category: Category,
    pub reason: String,
    pub idempotency_key: Option<String>,
    status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        from_wallet: WalletId,
        to_wallet: WalletId,
        amount: Decimal,
        category: Category,
        reason: String,
        idempotency_key: Option<String>,
        status: TransactionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from_wallet,
            to_wallet,
            amount,
            category,
            reason,
            idempotency_key,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn involves(&self, wallet: &WalletId) -> bool {
        self.from_wallet == *wallet || self.to_wallet == *wallet
    }

    /// Checks `next` against the state machine without changing anything.
    pub fn check_transition(&self, next: TransactionStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                transaction: self.id,
                status: self.status,
            });
        }
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                transaction: self.id,
                from: self.status,
                to: next,
            })
        }
    }

    /// Moves to `next`, returning the previous status.
    pub fn transition(
        &mut self,
        next: TransactionStatus,
    ) -> Result<TransactionStatus, TransitionError> {
        self.check_transition(next)?;
        let previous = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }
}
