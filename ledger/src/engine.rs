//! Account ledger: balance reads and the only path that mutates balances.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use ledgerbank_common::{
    validate_amount, Account, AccountNumber, BankError, Result, StorageError, Transaction,
    TransactionId, TransactionType,
};

use crate::balance::Balance;
use crate::journal::LegPair;
use crate::store::{LedgerStore, StoreResult};

/// Account ledger over a [`LedgerStore`].
///
/// Balances change only through [`AccountLedger::post_transaction`] and
/// [`AccountLedger::post_leg_pair`]; both hand a single atomic write to the
/// store. Overdrafts are not rejected.
#[derive(Clone)]
pub struct AccountLedger {
    store: Arc<dyn LedgerStore>,
}

impl AccountLedger {
    /// Create a ledger over `store`.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Find an account, or `None` if no account has this number.
    pub async fn find_account(&self, account_number: &AccountNumber) -> Result<Option<Account>> {
        Ok(self.store.find_account(account_number).await?)
    }

    /// Read an account's current balance.
    #[instrument(skip(self), fields(account = %account_number))]
    pub async fn get_balance(&self, account_number: &AccountNumber) -> Result<Balance> {
        let account = self.require_account(account_number).await?;
        Ok(Balance::from(&account))
    }

    /// Post a deposit (`in`) or withdrawal (`out`) and update the balance in
    /// the same store transaction.
    #[instrument(skip(self, notes), fields(account = %account_number))]
    pub async fn post_transaction(
        &self,
        account_number: &AccountNumber,
        transaction_type: TransactionType,
        amount: Decimal,
        notes: Option<String>,
    ) -> Result<TransactionId> {
        if transaction_type == TransactionType::Unknown {
            return Err(BankError::UnknownTransactionType);
        }
        validate_amount(amount)?;

        let account = self.require_account(account_number).await?;
        let transaction = Transaction::new(account.id, transaction_type, amount, notes);

        let id = self
            .store
            .insert_transaction_and_update_balance(&account, &transaction)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to post transaction");
                BankError::from(e)
            })?;

        info!(
            transaction_id = %id,
            direction = %transaction_type,
            amount = %amount,
            "Transaction posted"
        );
        Ok(id)
    }

    /// Post both legs of a transfer in one store transaction.
    #[instrument(skip_all, fields(transfer_id = %legs.transfer_id))]
    pub async fn post_leg_pair(
        &self,
        from: &Account,
        to: &Account,
        legs: &LegPair,
    ) -> StoreResult<()> {
        if !legs.is_balanced() {
            return Err(StorageError::Conflict(format!(
                "unbalanced legs for transfer {}",
                legs.transfer_id
            )));
        }

        self.store
            .insert_transfer_legs_and_update_balances(from, to, &legs.out_leg, &legs.in_leg)
            .await?;

        info!(
            from = %from.account_number,
            to = %to.account_number,
            amount = %legs.out_leg.amount,
            "Transfer legs posted"
        );
        Ok(())
    }

    /// All transactions posted to an account, oldest first.
    pub async fn transactions(&self, account_number: &AccountNumber) -> Result<Vec<Transaction>> {
        let account = self.require_account(account_number).await?;
        let mut transactions = self.store.list_transactions(account.id).await?;
        transactions.sort_by_key(|t| t.timestamp);
        Ok(transactions)
    }

    async fn require_account(&self, account_number: &AccountNumber) -> Result<Account> {
        self.find_account(account_number)
            .await?
            .ok_or_else(|| BankError::AccountNotFound(account_number.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedgerStore;
    use crate::store::StoreOperation;
    use ledgerbank_common::{Currency, Transfer};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    async fn setup() -> (Arc<InMemoryLedgerStore>, AccountLedger) {
        let store = Arc::new(InMemoryLedgerStore::new());
        store
            .open_account(Account::new("1001", "Alice", Currency::usd()))
            .unwrap();
        store
            .open_account(Account::new("1002", "Bob", Currency::usd()))
            .unwrap();
        let ledger = AccountLedger::new(store.clone());
        ledger
            .post_transaction(&"1001".into(), TransactionType::In, dec!(100), None)
            .await
            .unwrap();
        (store, ledger)
    }

    async fn balance_matches_transactions(ledger: &AccountLedger, number: &AccountNumber) -> bool {
        let balance = ledger.get_balance(number).await.unwrap().amount;
        let sum: Decimal = ledger
            .transactions(number)
            .await
            .unwrap()
            .iter()
            .map(Transaction::signed_amount)
            .sum();
        balance == sum
    }

    #[tokio::test]
    async fn test_post_updates_balance() {
        let (_, ledger) = setup().await;
        let alice = AccountNumber::new("1001");

        ledger
            .post_transaction(&alice, TransactionType::In, dec!(50), Some("salary".into()))
            .await
            .unwrap();
        ledger
            .post_transaction(&alice, TransactionType::Out, dec!(20), None)
            .await
            .unwrap();

        assert_eq!(ledger.get_balance(&alice).await.unwrap().amount, dec!(130));
        assert_eq!(ledger.transactions(&alice).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_overdraft_permitted() {
        let (_, ledger) = setup().await;
        let bob = AccountNumber::new("1002");

        ledger
            .post_transaction(&bob, TransactionType::Out, dec!(25), None)
            .await
            .unwrap();

        let balance = ledger.get_balance(&bob).await.unwrap();
        assert_eq!(balance.amount, dec!(-25));
        assert!(balance.is_overdrawn());
    }

    #[tokio::test]
    async fn test_missing_account() {
        let (store, ledger) = setup().await;
        let ghost = AccountNumber::new("9999");

        assert!(matches!(
            ledger.get_balance(&ghost).await,
            Err(BankError::AccountNotFound(n)) if n == ghost
        ));
        assert!(matches!(
            ledger.post_transaction(&ghost, TransactionType::In, dec!(1), None).await,
            Err(BankError::AccountNotFound(_))
        ));
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_before_write() {
        let (store, ledger) = setup().await;
        let alice = AccountNumber::new("1001");

        assert!(matches!(
            ledger.post_transaction(&alice, TransactionType::Unknown, dec!(5), None).await,
            Err(BankError::UnknownTransactionType)
        ));
        assert!(matches!(
            ledger.post_transaction(&alice, TransactionType::In, dec!(0), None).await,
            Err(BankError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger
                .post_transaction(&alice, TransactionType::Out, dec!(0.000000015), None)
                .await,
            Err(BankError::InvalidAmount(_))
        ));
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(ledger.get_balance(&alice).await.unwrap().amount, dec!(100));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_storage_error() {
        let (store, ledger) = setup().await;
        let alice = AccountNumber::new("1001");
        store.inject_fault(StoreOperation::InsertTransaction);

        let result = ledger
            .post_transaction(&alice, TransactionType::In, dec!(5), None)
            .await;

        assert!(matches!(
            result,
            Err(BankError::Storage(StorageError::Injected(_)))
        ));
        assert_eq!(ledger.get_balance(&alice).await.unwrap().amount, dec!(100));
    }

    #[tokio::test]
    async fn test_post_leg_pair() {
        let (_, ledger) = setup().await;
        let alice = ledger.find_account(&"1001".into()).await.unwrap().unwrap();
        let bob = ledger.find_account(&"1002".into()).await.unwrap().unwrap();
        let transfer = Transfer::new(&alice, &bob, Currency::usd(), dec!(40));

        ledger
            .post_leg_pair(&alice, &bob, &LegPair::for_transfer(&transfer))
            .await
            .unwrap();

        assert_eq!(ledger.get_balance(&"1001".into()).await.unwrap().amount, dec!(60));
        assert_eq!(ledger.get_balance(&"1002".into()).await.unwrap().amount, dec!(40));
    }

    #[tokio::test]
    async fn test_unbalanced_leg_pair_rejected() {
        let (store, ledger) = setup().await;
        let alice = ledger.find_account(&"1001".into()).await.unwrap().unwrap();
        let bob = ledger.find_account(&"1002".into()).await.unwrap().unwrap();
        let transfer = Transfer::new(&alice, &bob, Currency::usd(), dec!(40));
        let mut legs = LegPair::for_transfer(&transfer);
        legs.in_leg.amount = dec!(45);

        let result = ledger.post_leg_pair(&alice, &bob, &legs).await;

        assert!(matches!(result, Err(StorageError::Conflict(_))));
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(ledger.get_balance(&"1002".into()).await.unwrap().amount, dec!(0));
    }

    #[tokio::test]
    async fn test_overflowing_posting_is_refused_whole() {
        let (store, ledger) = setup().await;
        let bob = AccountNumber::new("1002");

        ledger
            .post_transaction(&bob, TransactionType::In, Decimal::MAX, None)
            .await
            .unwrap();
        let second = ledger
            .post_transaction(&bob, TransactionType::In, Decimal::MAX, None)
            .await;

        assert!(matches!(
            second,
            Err(BankError::Storage(StorageError::Conflict(_)))
        ));
        assert_eq!(store.transaction_count(), 2);
        assert_eq!(ledger.get_balance(&bob).await.unwrap().amount, Decimal::MAX);
        assert!(balance_matches_transactions(&ledger, &bob).await);
    }

    #[tokio::test]
    async fn test_repeated_reads_identical() {
        let (_, ledger) = setup().await;
        let alice = AccountNumber::new("1001");

        let first = ledger.get_balance(&alice).await.unwrap();
        let second = ledger.get_balance(&alice).await.unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_balance_equals_sum_of_postings(
            postings in prop::collection::vec((any::<bool>(), 1i64..100_000), 1..32)
        ) {
            tokio_test::block_on(async {
                let (_, ledger) = setup().await;
                let bob = AccountNumber::new("1002");

                for (inbound, cents) in &postings {
                    let direction = if *inbound { TransactionType::In } else { TransactionType::Out };
                    ledger
                        .post_transaction(&bob, direction, Decimal::new(*cents, 2), None)
                        .await
                        .unwrap();
                }

                assert!(balance_matches_transactions(&ledger, &bob).await);
            });
        }
    }
}
