/// Wallet balances and lifecycle.
/// State is modified using events, which are created by handling commands
pub mod wallet;

/// Input records for transfers, plus the validation shared by every operation.
pub mod command;

/// Transfers and their status state machine.
pub mod transaction;

/// Bank pool (supply accounting), the bank rule and mint/burn records.
pub mod bank;

/// Refund requests and their single-shot resolution.
pub mod refund;

/// Append-only audit entries.
pub mod audit;

/// Caller identity and role guards.
pub mod auth;

pub mod error;

/// Ledger operations, grouped by component.
/// Coordinates all the logic from command parsing to committed state
///
/// NOTE: `TransactionProcessor` is kept as a trait so a persistent
/// implementation can replace the in-memory one.
pub mod processor;

/// CSV export of wallets and the audit log.
pub mod report;

mod store;

pub use auth::{Principal, Role};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use processor::{Ledger, TransactionProcessor};
