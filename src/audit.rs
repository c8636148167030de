use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::ActorId;

pub type AuditId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BankSetup,
    BankRulesUpdated,
    WalletCreated,
    WalletStatusUpdated,
    WalletBalanceReset,
    TransactionCreated,
    TransactionStatusUpdated,
    TransactionRefunded,
    RefundRequested,
    RefundResolved,
    CurrencyMinted,
    CurrencyBurned,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::BankSetup => "bank_setup",
            AuditAction::BankRulesUpdated => "bank_rules_updated",
            AuditAction::WalletCreated => "wallet_created",
            AuditAction::WalletStatusUpdated => "wallet_status_updated",
            AuditAction::WalletBalanceReset => "wallet_balance_reset",
            AuditAction::TransactionCreated => "transaction_created",
            AuditAction::TransactionStatusUpdated => "transaction_status_updated",
            AuditAction::TransactionRefunded => "transaction_refunded",
            AuditAction::RefundRequested => "refund_requested",
            AuditAction::RefundResolved => "refund_resolved",
            AuditAction::CurrencyMinted => "currency_minted",
            AuditAction::CurrencyBurned => "currency_burned",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Bank,
    BankRule,
    Wallet,
    Transaction,
    RefundRequest,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityType::Bank => "bank",
            EntityType::BankRule => "bank_rule",
            EntityType::Wallet => "wallet",
            EntityType::Transaction => "transaction",
            EntityType::RefundRequest => "refund_request",
        })
    }
}

/// Immutable record of one mutation. Entries are only ever appended.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub actor: ActorId,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn record(
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Uuid,
        actor: ActorId,
        details: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            action,
            entity_type,
            entity_id,
            actor,
            details: serde_json::to_value(details)?,
            created_at: Utc::now(),
        })
    }
}
