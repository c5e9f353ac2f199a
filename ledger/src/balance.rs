//! Account balance snapshots.

use ledgerbank_common::{Account, AccountNumber, Currency, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance of an account as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Account number.
    pub account_number: AccountNumber,
    /// Account currency.
    pub currency: Currency,
    /// Current balance. May be negative; overdrafts are not rejected.
    pub amount: Decimal,
    /// When the balance last changed.
    pub as_of: Timestamp,
}

impl Balance {
    /// Whether the account is overdrawn.
    pub fn is_overdrawn(&self) -> bool {
        self.amount < Decimal::ZERO
    }
}

impl From<&Account> for Balance {
    fn from(account: &Account) -> Self {
        Self {
            account_number: account.account_number.clone(),
            currency: account.currency.clone(),
            amount: account.balance,
            as_of: account.updated_at,
        }
    }
}
