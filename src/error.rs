use std::fmt;

use thiserror::Error;

use crate::{
    auth::AuthError,
    bank::{PoolError, RuleViolation},
    command::ValidationError,
    refund::{RefundId, RefundStatus},
    transaction::{TransactionId, TransitionError},
    wallet::WalletError,
};

/// Coarse classification of [`LedgerError`], for callers that map errors
/// onto their own protocol (status codes, exit codes, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Conflict,
    InvariantViolation,
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Bank,
    Wallet,
    Transaction,
    RefundRequest,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Bank => "Bank",
            EntityKind::Wallet => "Wallet",
            EntityKind::Transaction => "Transaction",
            EntityKind::RefundRequest => "Refund request",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("Bank is already set up")]
    BankAlreadySetUp,
    #[error("Refund was already requested for transaction {transaction}")]
    RefundAlreadyRequested { transaction: TransactionId },
    #[error("Refund request {request} is already {status}")]
    RefundAlreadyResolved {
        request: RefundId,
        status: RefundStatus,
    },
}

#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Rule(#[from] RuleViolation),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: EntityKind, id: String },
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error("Failed to record audit entry: {0}")]
    Audit(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Unauthorized(_) => ErrorKind::Unauthorized,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::Invariant(_) => ErrorKind::InvariantViolation,
            LedgerError::Audit(_) => ErrorKind::Audit,
        }
    }
}

macro_rules! invariant_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for LedgerError {
                fn from(err: $err) -> Self {
                    LedgerError::Invariant(err.into())
                }
            }
        )*
    };
}

invariant_from!(WalletError, PoolError, TransitionError, RuleViolation);

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn nested_errors_keep_their_kind() {
        let err: LedgerError = WalletError::Burned {
            wallet: Uuid::nil(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);

        let err: LedgerError = ValidationError::NonPositiveAmount {
            field: "amount",
            amount: Decimal::ZERO,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "`amount` must be positive, got 0");

        let err = LedgerError::not_found(EntityKind::RefundRequest, "abc");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Refund request `abc` not found");
    }
}
