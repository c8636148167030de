use rust_decimal::{Decimal, prelude::Zero};
use serde::Deserialize;
use thiserror::Error;

use crate::{transaction::Category, wallet::WalletId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{field}` is required")]
    MissingField { field: &'static str },
    #[error("`{field}` must not be blank")]
    BlankField { field: &'static str },
    #[error("`{field}` must be positive, got {amount}")]
    NonPositiveAmount { field: &'static str, amount: Decimal },
    #[error("`{field}` must not be negative, got {amount}")]
    NegativeAmount { field: &'static str, amount: Decimal },
    #[error("Unknown category `{category}`, expected one of reward, penalty, trade, other")]
    UnknownCategory { category: String },
    #[error("Page must start at 1 and hold 1..={max_limit} items, got page {page} limit {limit}")]
    InvalidPage {
        page: usize,
        limit: usize,
        max_limit: usize,
    },
}

pub fn positive_amount(field: &'static str, amount: Decimal) -> Result<Decimal, ValidationError> {
    if amount > Decimal::zero() {
        Ok(amount)
    } else {
        Err(ValidationError::NonPositiveAmount { field, amount })
    }
}

pub fn non_negative_amount(
    field: &'static str,
    amount: Decimal,
) -> Result<Decimal, ValidationError> {
    if amount >= Decimal::zero() {
        Ok(amount)
    } else {
        Err(ValidationError::NegativeAmount { field, amount })
    }
}

pub fn non_blank(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::BlankField { field })
    } else {
        Ok(())
    }
}

/// Transfer request as it arrives from the caller, every field still unchecked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferRequest {
    pub from_wallet_id: Option<WalletId>,
    pub to_wallet_id: Option<WalletId>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    #[serde(default)]
    pub reason: String,
    pub idempotency_key: Option<String>,
}

impl TransferRequest {
    pub fn new(from: WalletId, to: WalletId, amount: Decimal, category: Category) -> Self {
        Self {
            from_wallet_id: Some(from),
            to_wallet_id: Some(to),
            amount: Some(amount),
            category: Some(category.to_string()),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Trimmed idempotency key, `None` when absent or blank. An empty key
    /// deduplicates nothing.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Transfer with every field present and well formed. Wallet state is not
/// looked at yet, that happens inside the unit of work.
#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub from: WalletId,
    pub to: WalletId,
    pub amount: Decimal,
    pub category: Category,
    pub reason: String,
    pub idempotency_key: Option<String>,
}

impl TransferCommand {
    pub fn parse(request: TransferRequest) -> Result<Self, ValidationError> {
        let from = request
            .from_wallet_id
            .ok_or(ValidationError::MissingField {
                field: "from_wallet_id",
            })?;
        let to = request.to_wallet_id.ok_or(ValidationError::MissingField {
            field: "to_wallet_id",
        })?;
        let amount = request
            .amount
            .ok_or(ValidationError::MissingField { field: "amount" })?;
        let amount = positive_amount("amount", amount)?;
        let category = request
            .category
            .as_deref()
            .ok_or(ValidationError::MissingField { field: "category" })?
            .parse()?;
        let idempotency_key = request.idempotency_key().map(str::to_string);

        Ok(Self {
            from,
            to,
            amount,
            category,
            reason: request.reason,
            idempotency_key,
        })
    }
}
