use crate::{
    auth::Principal,
    command::TransferRequest,
    error::LedgerResult,
    store::Store,
    transaction::{Transaction, TransactionId, TransactionStatus},
};

pub mod bank_pool;
pub mod currency;
pub mod queries;
pub mod refunds;
pub mod transfers;
pub mod wallet_store;

/// The ledger core: wallets, the currency pool and its rule, transactions,
/// refund requests, mint/burn history and the audit log.
///
/// Every operation takes the caller's [`Principal`], checks its role first,
/// and then runs as a single unit of work. `Ledger` is `Sync`, share it
/// behind an `Arc` to serve concurrent callers.
#[derive(Debug, Default)]
pub struct Ledger {
    store: Store,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transfer state machine.
///
/// NOTE: `Ledger` is the only implementation, the trait marks the seam where
/// a database-backed processor would plug in.
pub trait TransactionProcessor {
    /// Creates a transfer, settling it right away unless the bank rule
    /// requires approval. A request carrying an already used idempotency key
    /// returns the earlier transaction untouched.
    fn create_transaction(
        &self,
        principal: &Principal,
        request: TransferRequest,
    ) -> LedgerResult<Transaction>;

    /// Moves a pending transaction to `complete` or `cancelled`.
    fn advance_transaction(
        &self,
        principal: &Principal,
        id: TransactionId,
        new_status: TransactionStatus,
        reason: &str,
    ) -> LedgerResult<Transaction>;
}

#[cfg(test)]
pub(crate) mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::bank::BankSetup;

    /// Ledger with a freshly set up bank, plus the admin who set it up.
    pub(crate) fn test_ledger(initial_supply: i64) -> (Ledger, Principal) {
        let ledger = Ledger::new();
        let admin = Principal::admin(Uuid::new_v4());
        ledger
            .setup(
                &admin,
                BankSetup {
                    bank_name: "Guild".to_string(),
                    currency_name: "Coin".to_string(),
                    currency_symbol: "C".to_string(),
                    initial_supply: Decimal::from(initial_supply),
                },
            )
            .unwrap();
        (ledger, admin)
    }
}
