//! Simulated account holders.

use rust_decimal::Decimal;
use tracing::info;

use ledgerbank_common::{Account, AccountNumber, Currency};
use ledgerbank_coordinator::{Coordinator, TransactionRequest};
use ledgerbank_ledger::InMemoryLedgerStore;

const HOLDER_NAMES: [&str; 10] = [
    "Alice Archer",
    "Bob Brennan",
    "Carmen Cruz",
    "Dev Desai",
    "Elif Ersoy",
    "Farah Faris",
    "Goran Gal",
    "Hana Hayashi",
    "Ivo Ilic",
    "Jun Jeong",
];

/// Account numbers start here and count up.
pub const FIRST_ACCOUNT_NUMBER: u32 = 1001;

/// Account factory for seeding the simulated ledger.
pub struct AccountFactory;

impl AccountFactory {
    /// Describe `count` USD accounts, numbered from [`FIRST_ACCOUNT_NUMBER`].
    pub fn create_accounts(count: usize) -> Vec<Account> {
        (0..count)
            .map(|i| {
                let number = (FIRST_ACCOUNT_NUMBER as usize + i).to_string();
                let name = match HOLDER_NAMES.get(i) {
                    Some(name) => name.to_string(),
                    None => format!("Holder {}", i + 1),
                };
                Account::new(number, name, Currency::usd())
            })
            .collect()
    }

    /// Open `count` accounts at zero and fund each with `initial_deposit`.
    ///
    /// Funding goes through the ledger so every balance is backed by
    /// transactions.
    pub async fn seed(
        store: &InMemoryLedgerStore,
        coordinator: &Coordinator,
        count: usize,
        initial_deposit: Decimal,
    ) -> anyhow::Result<Vec<AccountNumber>> {
        let mut numbers = Vec::with_capacity(count);
        for account in Self::create_accounts(count) {
            let number = account.account_number.clone();
            store.open_account(account)?;

            if initial_deposit > Decimal::ZERO {
                coordinator
                    .post_transaction(
                        TransactionRequest::deposit(number.clone(), initial_deposit)
                            .with_notes("opening deposit"),
                    )
                    .await?;
            }
            info!(account = %number, deposit = %initial_deposit, "Account opened");
            numbers.push(number);
        }
        Ok(numbers)
    }
}
