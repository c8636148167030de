use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    audit::AuditEntry,
    auth::{Access, Principal},
    bank::CurrencyOperation,
    command::ValidationError,
    error::{EntityKind, LedgerError, LedgerResult},
    refund::{RefundRequest, RefundStatus},
    transaction::{Transaction, TransactionId, TransactionStatus},
    wallet::{OwnerId, Wallet, WalletId, WalletStatus},
};

use super::Ledger;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn new(page: usize, limit: usize) -> Self {
        Self { page, limit }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.page == 0 || self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(ValidationError::InvalidPage {
                page: self.page,
                limit: self.limit,
                max_limit: MAX_PAGE_LIMIT,
            });
        }
        Ok(())
    }

    /// Number of items before this page. Saturates, any page that far out
    /// is simply empty.
    fn offset(self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }

    fn slice<T: Clone>(self, items: Vec<&T>) -> Paginated<T> {
        let total = items.len();
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.limit)
            .cloned()
            .collect();
        Paginated {
            items,
            total,
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub wallet_id: WalletId,
    pub name: String,
    pub balance: Decimal,
}

/// Figures needed to check the conservation invariants by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub total_supply: Decimal,
    pub in_circulation: Decimal,
    /// Sum over active and frozen wallets.
    pub wallet_balances: Decimal,
    /// Genesis supply plus every mint, minus every burn.
    pub replayed_supply: Decimal,
}

impl Reconciliation {
    pub fn free_pool(&self) -> Decimal {
        self.total_supply - self.in_circulation
    }

    pub fn is_consistent(&self) -> bool {
        self.in_circulation >= Decimal::ZERO
            && self.total_supply >= self.in_circulation
            && self.wallet_balances == self.in_circulation
            && self.replayed_supply == self.total_supply
    }
}

fn newest_first<T>(items: &mut [&T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| Reverse(created_at(*item)));
}

impl Ledger {
    pub fn wallet(&self, principal: &Principal, id: WalletId) -> LedgerResult<Wallet> {
        principal.require(Access::Anyone, "read wallet")?;
        self.store.read(|state| {
            state
                .wallets
                .get(&id)
                .cloned()
                .ok_or_else(|| LedgerError::not_found(EntityKind::Wallet, id))
        })
    }

    pub fn owner_wallets(&self, principal: &Principal, owner: OwnerId) -> LedgerResult<Vec<Wallet>> {
        principal.require(Access::Anyone, "list wallets")?;
        Ok(self.store.read(|state| {
            let mut wallets: Vec<Wallet> = state
                .wallets
                .values()
                .filter(|wallet| wallet.owner == owner)
                .cloned()
                .collect();
            wallets.sort_by_key(|wallet| wallet.created_at);
            wallets
        }))
    }

    pub fn transaction(&self, principal: &Principal, id: TransactionId) -> LedgerResult<Transaction> {
        principal.require(Access::Anyone, "read transaction")?;
        self.store.read(|state| {
            state
                .transactions
                .get(&id)
                .cloned()
                .ok_or_else(|| LedgerError::not_found(EntityKind::Transaction, id))
        })
    }

    /// Active wallets ordered by balance, richest first.
    pub fn leaderboard(
        &self,
        principal: &Principal,
        page: Page,
    ) -> LedgerResult<Paginated<LeaderboardEntry>> {
        principal.require(Access::Anyone, "read leaderboard")?;
        page.validate()?;
        let wallets = self.store.read(|state| {
            let mut wallets: Vec<&Wallet> = state
                .wallets
                .values()
                .filter(|wallet| wallet.status() == WalletStatus::Active)
                .collect();
            wallets.sort_by(|a, b| {
                b.balance()
                    .cmp(&a.balance())
                    .then_with(|| a.created_at.cmp(&b.created_at))
            });
            page.slice(wallets)
        });
        let offset = page.offset();
        Ok(Paginated {
            items: wallets
                .items
                .into_iter()
                .enumerate()
                .map(|(idx, wallet)| LeaderboardEntry {
                    rank: offset + idx + 1,
                    wallet_id: wallet.id,
                    balance: wallet.balance(),
                    name: wallet.name,
                })
                .collect(),
            total: wallets.total,
            page: wallets.page,
            limit: wallets.limit,
        })
    }

    /// Every settled or closed transaction, pending ones are not public.
    pub fn public_transactions(
        &self,
        principal: &Principal,
        page: Page,
    ) -> LedgerResult<Paginated<Transaction>> {
        principal.require(Access::Anyone, "list transactions")?;
        page.validate()?;
        Ok(self.store.read(|state| {
            let mut txs: Vec<&Transaction> = state
                .transactions
                .values()
                .filter(|tx| tx.status() != TransactionStatus::Pending)
                .collect();
            newest_first(&mut txs, |tx| tx.created_at);
            page.slice(txs)
        }))
    }

    /// Transactions touching any wallet of `owner`. Only admins see pending
    /// ones.
    pub fn owner_transactions(
        &self,
        principal: &Principal,
        owner: OwnerId,
        page: Page,
    ) -> LedgerResult<Paginated<Transaction>> {
        principal.require(Access::UserOrAdmin, "list owner transactions")?;
        page.validate()?;
        let include_pending = principal.is_admin();
        Ok(self.store.read(|state| {
            let wallets: Vec<WalletId> = state
                .wallets
                .values()
                .filter(|wallet| wallet.owner == owner)
                .map(|wallet| wallet.id)
                .collect();
            let mut txs: Vec<&Transaction> = state
                .transactions
                .values()
                .filter(|tx| wallets.iter().any(|wallet| tx.involves(wallet)))
                .filter(|tx| include_pending || tx.status() != TransactionStatus::Pending)
                .collect();
            newest_first(&mut txs, |tx| tx.created_at);
            page.slice(txs)
        }))
    }

    pub fn audit_log(&self, principal: &Principal, page: Page) -> LedgerResult<Paginated<AuditEntry>> {
        principal.require(Access::Admin, "read audit log")?;
        page.validate()?;
        Ok(self.store.read(|state| {
            // appended in commit order already
            let entries: Vec<&AuditEntry> = state.audit_log.iter().rev().collect();
            page.slice(entries)
        }))
    }

    pub fn currency_operations(
        &self,
        principal: &Principal,
        page: Page,
    ) -> LedgerResult<Paginated<CurrencyOperation>> {
        principal.require(Access::Admin, "read currency operations")?;
        page.validate()?;
        Ok(self.store.read(|state| {
            let ops: Vec<&CurrencyOperation> = state.currency_operations.iter().rev().collect();
            page.slice(ops)
        }))
    }

    /// Refund requests waiting for a decision, oldest first.
    pub fn pending_refunds(
        &self,
        principal: &Principal,
        page: Page,
    ) -> LedgerResult<Paginated<RefundRequest>> {
        principal.require(Access::Admin, "list refund requests")?;
        page.validate()?;
        Ok(self.store.read(|state| {
            let mut requests: Vec<&RefundRequest> = state
                .refunds
                .values()
                .filter(|request| request.status() == RefundStatus::Pending)
                .collect();
            requests.sort_by_key(|request| request.created_at);
            page.slice(requests)
        }))
    }

    pub fn reconcile(&self, principal: &Principal) -> LedgerResult<Reconciliation> {
        principal.require(Access::Admin, "reconcile ledger")?;
        let report = self.store.read(|state| {
            let pool = state
                .pool
                .as_ref()
                .ok_or_else(|| LedgerError::not_found(EntityKind::Bank, "pool"))?;
            let wallet_balances = state
                .wallets
                .values()
                .filter(|wallet| wallet.is_circulating())
                .map(Wallet::balance)
                .sum();
            let replayed_supply = pool.genesis_supply
                + state
                    .currency_operations
                    .iter()
                    .map(CurrencyOperation::supply_delta)
                    .sum::<Decimal>();
            Ok::<_, LedgerError>(Reconciliation {
                total_supply: pool.total_supply(),
                in_circulation: pool.in_circulation(),
                wallet_balances,
                replayed_supply,
            })
        })?;
        debug!(?report, consistent = report.is_consistent(), "ledger reconciled");
        Ok(report)
    }
}
