//! CSV export of ledger state, for spreadsheets and offline reconciliation.

use std::io::Write;

use anyhow::Context;
use chrono::{DateTime, Utc};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, EntityType},
    auth::ActorId,
    wallet::{OwnerId, Wallet, WalletId, WalletStatus},
};

#[derive(Debug, Serialize)]
struct WalletRow<'a> {
    wallet: WalletId,
    owner: OwnerId,
    name: &'a str,
    balance: Decimal,
    status: WalletStatus,
}

#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    created_at: DateTime<Utc>,
    action: AuditAction,
    entity_type: EntityType,
    entity_id: Uuid,
    actor: ActorId,
    details: &'a str,
}

fn finish<W: Write>(mut writer: Writer<W>) -> anyhow::Result<()> {
    // Ensure all data is flushed to the output
    writer.flush().context("Failed to flush CSV writer")
}

pub fn write_wallets_csv<'a, W>(
    output: W,
    wallets: impl IntoIterator<Item = &'a Wallet>,
) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for wallet in wallets {
        writer
            .serialize(WalletRow {
                wallet: wallet.id,
                owner: wallet.owner,
                name: &wallet.name,
                balance: wallet.balance(),
                status: wallet.status(),
            })
            .with_context(|| format!("Failed to write wallet {} to CSV", wallet.id))?;
    }
    finish(writer)
}

pub fn write_audit_csv<'a, W>(
    output: W,
    entries: impl IntoIterator<Item = &'a AuditEntry>,
) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for entry in entries {
        let details = entry.details.to_string();
        writer
            .serialize(AuditRow {
                created_at: entry.created_at,
                action: entry.action,
                entity_type: entry.entity_type,
                entity_id: entry.entity_id,
                actor: entry.actor,
                details: &details,
            })
            .with_context(|| format!("Failed to write audit entry {} to CSV", entry.id))?;
    }
    finish(writer)
}
