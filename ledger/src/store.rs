//! Ledger store contract.
//!
//! The store is the single serialization point of the core: every
//! multi-write method must commit all of its writes or none of them, and
//! balance updates must be applied against the stored balance so that
//! concurrent postings on the same account cannot lose updates.

use async_trait::async_trait;

use ledgerbank_common::{
    Account, AccountId, AccountNumber, CurrencyPair, ExchangeRate, RateId, StorageError,
    Timestamp, Transaction, TransactionId, Transfer, TransferId,
};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StorageError>;

/// Operations of the store contract, used to address injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FindAccount,
    InsertExchangeRate,
    FindExchangeRate,
    InsertTransaction,
    InsertTransfer,
    InsertTransferLegs,
    UpdateTransferStatus,
}

impl StoreOperation {
    /// Operation name as reported in errors.
    pub fn name(&self) -> &'static str {
        match self {
            StoreOperation::FindAccount => "find_account",
            StoreOperation::InsertExchangeRate => "insert_exchange_rate",
            StoreOperation::FindExchangeRate => "find_exchange_rate",
            StoreOperation::InsertTransaction => "insert_transaction_and_update_balance",
            StoreOperation::InsertTransfer => "insert_transfer",
            StoreOperation::InsertTransferLegs => "insert_transfer_legs_and_update_balances",
            StoreOperation::UpdateTransferStatus => "update_transfer_status",
        }
    }
}

/// Durable, transactional storage for accounts, transactions, transfers
/// and exchange rates.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Find an account by its external number.
    async fn find_account(&self, account_number: &AccountNumber) -> StoreResult<Option<Account>>;

    /// Append an exchange rate.
    async fn insert_exchange_rate(&self, rate: &ExchangeRate) -> StoreResult<RateId>;

    /// Find a rate for `pair` whose window contains `at`. When several
    /// windows match, the most recently published one is returned.
    async fn find_exchange_rate(
        &self,
        pair: &CurrencyPair,
        at: Timestamp,
    ) -> StoreResult<Option<ExchangeRate>>;

    /// Insert `transaction` and apply its signed amount to `account`'s
    /// balance, atomically.
    async fn insert_transaction_and_update_balance(
        &self,
        account: &Account,
        transaction: &Transaction,
    ) -> StoreResult<TransactionId>;

    /// Insert a transfer record.
    async fn insert_transfer(&self, transfer: &Transfer) -> StoreResult<TransferId>;

    /// Insert both legs of a transfer and update both balances, atomically.
    async fn insert_transfer_legs_and_update_balances(
        &self,
        from: &Account,
        to: &Account,
        out_leg: &Transaction,
        in_leg: &Transaction,
    ) -> StoreResult<()>;

    /// Set a transfer's success flag.
    async fn update_transfer_status(&self, transfer: &Transfer, success: bool) -> StoreResult<()>;

    /// Find a transfer record by ID.
    async fn find_transfer(&self, id: TransferId) -> StoreResult<Option<Transfer>>;

    /// All transactions posted to an account, in posting order.
    async fn list_transactions(&self, account_id: AccountId) -> StoreResult<Vec<Transaction>>;
}
