//! In-memory storage with all-or-nothing units of work.
//!
//! Every row lives behind one lock. A [`UnitOfWork`] holds the lock for its
//! whole lifetime, reads through its own staged writes, and only touches the
//! shared state when the closure driving it returns `Ok`.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditId, EntityType},
    auth::ActorId,
    bank::{BankPool, BankRule, CurrencyOperation},
    error::{EntityKind, LedgerError, LedgerResult},
    refund::{RefundId, RefundRequest},
    transaction::{Transaction, TransactionId},
    wallet::{Wallet, WalletId},
};

/// Committed rows plus the unique indexes over them.
#[derive(Debug, Default)]
pub struct LedgerState {
    pub(crate) pool: Option<BankPool>,
    pub(crate) rule: Option<BankRule>,
    pub(crate) wallets: HashMap<WalletId, Wallet>,
    pub(crate) transactions: HashMap<TransactionId, Transaction>,
    pub(crate) idempotency_keys: HashMap<String, TransactionId>,
    pub(crate) refunds: HashMap<RefundId, RefundRequest>,
    pub(crate) refunds_by_transaction: HashMap<TransactionId, RefundId>,
    pub(crate) currency_operations: Vec<CurrencyOperation>,
    pub(crate) audit_log: Vec<AuditEntry>,
}

impl LedgerState {
    fn commit(&mut self, changes: Changes) {
        if let Some(pool) = changes.pool {
            self.pool = Some(pool);
        }
        if let Some(rule) = changes.rule {
            self.rule = Some(rule);
        }
        self.wallets.extend(changes.wallets);
        for (id, tx) in changes.transactions {
            if let Some(key) = &tx.idempotency_key {
                self.idempotency_keys.insert(key.clone(), id);
            }
            self.transactions.insert(id, tx);
        }
        for (id, refund) in changes.refunds {
            self.refunds_by_transaction.insert(refund.transaction_id, id);
            self.refunds.insert(id, refund);
        }
        self.currency_operations.extend(changes.currency_operations);
        self.audit_log.extend(changes.audit_log);
    }
}

#[derive(Debug, Default)]
struct Changes {
    pool: Option<BankPool>,
    rule: Option<BankRule>,
    wallets: HashMap<WalletId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    refunds: HashMap<RefundId, RefundRequest>,
    currency_operations: Vec<CurrencyOperation>,
    audit_log: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
pub struct Store {
    state: Mutex<LedgerState>,
}

impl Store {
    // A panic inside a unit of work never reaches `commit`, so the state
    // behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> T {
        let state = self.lock();
        f(&state)
    }

    /// Runs `f` as one serializable unit of work. Staged writes are committed
    /// only if `f` succeeds.
    pub fn write<T>(&self, f: impl FnOnce(&mut UnitOfWork<'_>) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut state = self.lock();
        let mut uow = UnitOfWork {
            base: &state,
            changes: Changes::default(),
        };
        let value = f(&mut uow)?;
        let changes = uow.changes;
        state.commit(changes);
        Ok(value)
    }
}

pub struct UnitOfWork<'s> {
    base: &'s LedgerState,
    changes: Changes,
}

impl UnitOfWork<'_> {
    pub fn has_pool(&self) -> bool {
        self.changes.pool.is_some() || self.base.pool.is_some()
    }

    pub fn pool(&self) -> LedgerResult<BankPool> {
        self.changes
            .pool
            .as_ref()
            .or(self.base.pool.as_ref())
            .cloned()
            .ok_or_else(|| LedgerError::not_found(EntityKind::Bank, "pool"))
    }

    pub fn put_pool(&mut self, pool: BankPool) {
        self.changes.pool = Some(pool);
    }

    pub fn rule(&self) -> LedgerResult<BankRule> {
        self.changes
            .rule
            .as_ref()
            .or(self.base.rule.as_ref())
            .cloned()
            .ok_or_else(|| LedgerError::not_found(EntityKind::Bank, "rule"))
    }

    pub fn put_rule(&mut self, rule: BankRule) {
        self.changes.rule = Some(rule);
    }

    pub fn wallet(&self, id: &WalletId) -> LedgerResult<Wallet> {
        self.changes
            .wallets
            .get(id)
            .or_else(|| self.base.wallets.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::not_found(EntityKind::Wallet, id))
    }

    pub fn put_wallet(&mut self, wallet: Wallet) {
        self.changes.wallets.insert(wallet.id, wallet);
    }

    pub fn transaction(&self, id: &TransactionId) -> LedgerResult<Transaction> {
        self.changes
            .transactions
            .get(id)
            .or_else(|| self.base.transactions.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::not_found(EntityKind::Transaction, id))
    }

    pub fn transaction_by_key(&self, key: &str) -> Option<Transaction> {
        let staged = self
            .changes
            .transactions
            .values()
            .find(|tx| tx.idempotency_key.as_deref() == Some(key));
        staged
            .or_else(|| {
                self.base
                    .idempotency_keys
                    .get(key)
                    .and_then(|id| self.base.transactions.get(id))
            })
            .cloned()
    }

    pub fn put_transaction(&mut self, tx: Transaction) {
        self.changes.transactions.insert(tx.id, tx);
    }

    pub fn refund(&self, id: &RefundId) -> LedgerResult<RefundRequest> {
        self.changes
            .refunds
            .get(id)
            .or_else(|| self.base.refunds.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::not_found(EntityKind::RefundRequest, id))
    }

    pub fn refund_for_transaction(&self, transaction: &TransactionId) -> Option<RefundRequest> {
        let staged = self
            .changes
            .refunds
            .values()
            .find(|refund| refund.transaction_id == *transaction);
        staged
            .or_else(|| {
                self.base
                    .refunds_by_transaction
                    .get(transaction)
                    .and_then(|id| self.base.refunds.get(id))
            })
            .cloned()
    }

    pub fn put_refund(&mut self, refund: RefundRequest) {
        self.changes.refunds.insert(refund.id, refund);
    }

    pub fn push_currency_operation(&mut self, operation: CurrencyOperation) {
        self.changes.currency_operations.push(operation);
    }

    /// Appends an audit entry that commits, or rolls back, with the rest of
    /// this unit of work.
    pub fn audit(
        &mut self,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Uuid,
        actor: ActorId,
        details: impl Serialize,
    ) -> LedgerResult<AuditId> {
        let entry = AuditEntry::record(action, entity_type, entity_id, actor, details)?;
        let id = entry.id;
        self.changes.audit_log.push(entry);
        Ok(id)
    }
}
