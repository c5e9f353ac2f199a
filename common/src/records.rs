//! Persisted records: accounts, transactions, transfers and exchange rates.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AccountId, AccountNumber, Currency, CurrencyPair, RateId, Timestamp, TransactionId,
    TransactionType, TransferId,
};

/// A customer account.
///
/// `balance` is a maintained running total: it always equals the sum of the
/// signed amounts of every transaction posted to the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Internal identity.
    pub id: AccountId,
    /// Externally assigned account number.
    pub account_number: AccountNumber,
    /// Account holder name.
    pub name: String,
    /// Account currency.
    pub currency: Currency,
    /// Current balance.
    pub balance: Decimal,
    /// When the account was created.
    pub created_at: Timestamp,
    /// When the balance last changed.
    pub updated_at: Timestamp,
}

impl Account {
    /// Create a new, empty account.
    pub fn new(
        account_number: impl Into<AccountNumber>,
        name: impl Into<String>,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            account_number: account_number.into(),
            name: name.into(),
            currency,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An immutable posting against one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID.
    pub id: TransactionId,
    /// Account the transaction belongs to.
    pub account_id: AccountId,
    /// Direction.
    pub transaction_type: TransactionType,
    /// Positive amount.
    pub amount: Decimal,
    /// When the transaction happened.
    pub timestamp: Timestamp,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Transfer this transaction is a leg of, if any.
    pub transfer_id: Option<TransferId>,
}

impl Transaction {
    /// Create a new transaction on an account.
    pub fn new(
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Decimal,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            account_id,
            transaction_type,
            amount,
            timestamp: Utc::now(),
            notes,
            transfer_id: None,
        }
    }

    /// Create the `out` leg of a transfer.
    pub fn transfer_out(transfer: &Transfer) -> Self {
        Self {
            notes: Some(format!("transfer {} out", transfer.id)),
            transfer_id: Some(transfer.id),
            timestamp: transfer.timestamp,
            ..Self::new(transfer.from_account_id, TransactionType::Out, transfer.amount, None)
        }
    }

    /// Create the `in` leg of a transfer.
    pub fn transfer_in(transfer: &Transfer) -> Self {
        Self {
            notes: Some(format!("transfer {} in", transfer.id)),
            transfer_id: Some(transfer.id),
            timestamp: transfer.timestamp,
            ..Self::new(transfer.to_account_id, TransactionType::In, transfer.amount, None)
        }
    }

    /// Signed effect on the account balance. Zero for an unknown direction,
    /// which is never persisted.
    pub fn signed_amount(&self) -> Decimal {
        self.transaction_type
            .signed(self.amount)
            .unwrap_or(Decimal::ZERO)
    }
}

/// A movement of funds between two accounts.
///
/// `success` starts `false` and becomes `true` only after both legs are
/// durably posted and both balances updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Unique transfer ID.
    pub id: TransferId,
    /// Source account.
    pub from_account_id: AccountId,
    /// Destination account.
    pub to_account_id: AccountId,
    /// Currency, recorded for audit; no conversion is applied.
    pub currency: Currency,
    /// Positive amount moved.
    pub amount: Decimal,
    /// When the transfer was requested.
    pub timestamp: Timestamp,
    /// Whether both legs were posted.
    pub success: bool,
}

impl Transfer {
    /// Create a new transfer intent.
    pub fn new(from: &Account, to: &Account, currency: Currency, amount: Decimal) -> Self {
        Self {
            id: TransferId::new(),
            from_account_id: from.id,
            to_account_id: to.id,
            currency,
            amount,
            timestamp: Utc::now(),
            success: false,
        }
    }
}

/// An exchange rate valid over `[valid_from, valid_to]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Unique rate ID.
    pub id: RateId,
    /// Currency pair.
    pub pair: CurrencyPair,
    /// Units of `pair.to` per unit of `pair.from`.
    pub rate: Decimal,
    /// Start of validity, inclusive.
    pub valid_from: Timestamp,
    /// End of validity, inclusive.
    pub valid_to: Timestamp,
    /// When the rate was published. Later publications win ties.
    pub created_at: Timestamp,
}

impl ExchangeRate {
    /// Create a new rate.
    pub fn new(pair: CurrencyPair, rate: Decimal, valid_from: Timestamp, valid_to: Timestamp) -> Self {
        Self {
            id: RateId::new(),
            pair,
            rate,
            valid_from,
            valid_to,
            created_at: Utc::now(),
        }
    }

    /// Check whether `at` falls inside the validity window.
    pub fn covers(&self, at: Timestamp) -> bool {
        self.valid_from <= at && at <= self.valid_to
    }
}
