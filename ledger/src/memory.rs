//! In-memory ledger store for tests, simulation and local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use ledgerbank_common::{
    Account, AccountId, AccountNumber, CurrencyPair, ExchangeRate, RateId, StorageError,
    Timestamp, Transaction, TransactionId, Transfer, TransferId,
};

use crate::store::{LedgerStore, StoreOperation, StoreResult};

#[derive(Default)]
struct StoreState {
    accounts: HashMap<AccountId, Account>,
    account_numbers: HashMap<AccountNumber, AccountId>,
    transactions: Vec<Transaction>,
    transfers: HashMap<TransferId, Transfer>,
    rates: Vec<ExchangeRate>,
}

impl StoreState {
    fn signed_amount(transaction: &Transaction) -> StoreResult<Decimal> {
        transaction
            .transaction_type
            .signed(transaction.amount)
            .ok_or_else(|| StorageError::Conflict("unknown transaction type".into()))
    }

    fn require_account(&self, id: AccountId) -> StoreResult<()> {
        if self.accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("account {id}")))
        }
    }

    /// Balance of `id` after adding `delta` to its staged or stored balance.
    /// Fails on overflow without touching anything.
    fn stage_balance(
        &self,
        staged: &mut HashMap<AccountId, Decimal>,
        id: AccountId,
        delta: Decimal,
    ) -> StoreResult<()> {
        let current = match staged.get(&id) {
            Some(balance) => *balance,
            None => self
                .accounts
                .get(&id)
                .map(|a| a.balance)
                .ok_or_else(|| StorageError::NotFound(format!("account {id}")))?,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StorageError::Conflict(format!("balance overflow on account {id}")))?;
        staged.insert(id, next);
        Ok(())
    }

    fn commit(
        &mut self,
        transactions: Vec<Transaction>,
        balances: HashMap<AccountId, Decimal>,
        at: Timestamp,
    ) {
        self.transactions.extend(transactions);
        for (id, balance) in balances {
            if let Some(account) = self.accounts.get_mut(&id) {
                account.balance = balance;
                account.updated_at = at;
            }
        }
    }
}

/// Ledger store holding everything behind one mutex.
///
/// Every contract method validates under the lock before writing anything,
/// so multi-write operations are all-or-nothing. Faults can be injected per
/// operation; each injected fault fires once.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<StoreState>,
    faults: Mutex<HashSet<StoreOperation>>,
}

impl InMemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account out of band. Account numbers must be unique.
    pub fn open_account(&self, account: Account) -> StoreResult<AccountId> {
        let mut state = self.state.lock();
        if state.account_numbers.contains_key(&account.account_number) {
            return Err(StorageError::Conflict(format!(
                "account number {} already exists",
                account.account_number
            )));
        }

        let id = account.id;
        state.account_numbers.insert(account.account_number.clone(), id);
        state.accounts.insert(id, account);
        debug!(account_id = %id, "Account opened");
        Ok(id)
    }

    /// Make the next call to `operation` fail.
    pub fn inject_fault(&self, operation: StoreOperation) {
        self.faults.lock().insert(operation);
    }

    /// Remove all pending faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Look up an account by internal ID.
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.state.lock().accounts.get(&id).cloned()
    }

    /// All accounts, ordered by account number.
    pub fn accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.state.lock().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        accounts
    }

    /// All transfer records.
    pub fn transfers(&self) -> Vec<Transfer> {
        self.state.lock().transfers.values().cloned().collect()
    }

    /// Number of transactions stored.
    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    /// Number of exchange rates stored.
    pub fn rate_count(&self) -> usize {
        self.state.lock().rates.len()
    }

    fn check_fault(&self, operation: StoreOperation) -> StoreResult<()> {
        if self.faults.lock().remove(&operation) {
            debug!(operation = operation.name(), "Injected fault fired");
            return Err(StorageError::Injected(operation.name()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_account(&self, account_number: &AccountNumber) -> StoreResult<Option<Account>> {
        self.check_fault(StoreOperation::FindAccount)?;

        let state = self.state.lock();
        Ok(state
            .account_numbers
            .get(account_number)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn insert_exchange_rate(&self, rate: &ExchangeRate) -> StoreResult<RateId> {
        self.check_fault(StoreOperation::InsertExchangeRate)?;

        let mut state = self.state.lock();
        if state.rates.iter().any(|r| r.id == rate.id) {
            return Err(StorageError::Conflict(format!("rate {} already exists", rate.id)));
        }
        state.rates.push(rate.clone());
        Ok(rate.id)
    }

    async fn find_exchange_rate(
        &self,
        pair: &CurrencyPair,
        at: Timestamp,
    ) -> StoreResult<Option<ExchangeRate>> {
        self.check_fault(StoreOperation::FindExchangeRate)?;

        // Rates are appended in publication order, so the last match is the
        // most recently published.
        let state = self.state.lock();
        Ok(state
            .rates
            .iter()
            .rev()
            .find(|r| &r.pair == pair && r.covers(at))
            .cloned())
    }

    async fn insert_transaction_and_update_balance(
        &self,
        account: &Account,
        transaction: &Transaction,
    ) -> StoreResult<TransactionId> {
        self.check_fault(StoreOperation::InsertTransaction)?;

        let mut state = self.state.lock();
        state.require_account(account.id)?;
        let delta = StoreState::signed_amount(transaction)?;

        let mut balances = HashMap::with_capacity(1);
        state.stage_balance(&mut balances, account.id, delta)?;
        state.commit(vec![transaction.clone()], balances, Utc::now());
        Ok(transaction.id)
    }

    async fn insert_transfer(&self, transfer: &Transfer) -> StoreResult<TransferId> {
        self.check_fault(StoreOperation::InsertTransfer)?;

        let mut state = self.state.lock();
        if state.transfers.contains_key(&transfer.id) {
            return Err(StorageError::Conflict(format!(
                "transfer {} already exists",
                transfer.id
            )));
        }
        state.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer.id)
    }

    async fn insert_transfer_legs_and_update_balances(
        &self,
        from: &Account,
        to: &Account,
        out_leg: &Transaction,
        in_leg: &Transaction,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.require_account(from.id)?;
        state.require_account(to.id)?;

        // Stage every write, then apply them together.
        let mut balances = HashMap::with_capacity(2);
        let out_delta = StoreState::signed_amount(out_leg)?;
        state.stage_balance(&mut balances, out_leg.account_id, out_delta)?;
        self.check_fault(StoreOperation::InsertTransferLegs)?;
        let in_delta = StoreState::signed_amount(in_leg)?;
        state.stage_balance(&mut balances, in_leg.account_id, in_delta)?;

        state.commit(vec![out_leg.clone(), in_leg.clone()], balances, Utc::now());
        Ok(())
    }

    async fn update_transfer_status(&self, transfer: &Transfer, success: bool) -> StoreResult<()> {
        self.check_fault(StoreOperation::UpdateTransferStatus)?;

        let mut state = self.state.lock();
        let record = state
            .transfers
            .get_mut(&transfer.id)
            .ok_or_else(|| StorageError::NotFound(format!("transfer {}", transfer.id)))?;
        record.success = success;
        Ok(())
    }

    async fn find_transfer(&self, id: TransferId) -> StoreResult<Option<Transfer>> {
        Ok(self.state.lock().transfers.get(&id).cloned())
    }

    async fn list_transactions(&self, account_id: AccountId) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }
}
