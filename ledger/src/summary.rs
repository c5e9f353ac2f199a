//! Running in/out/net totals over a stream of transactions.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerbank_common::{AccountNumber, BankError, Result, Transaction, TransactionType};

/// Totals of one summarization session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Account number of the most recently summarized transaction, if known.
    pub account_number: Option<AccountNumber>,
    /// Day the session was opened (UTC).
    pub summary_date: NaiveDate,
    /// Sum of `in` amounts.
    pub sum_in: Decimal,
    /// Sum of `out` amounts.
    pub sum_out: Decimal,
    /// `sum_in - sum_out`.
    pub sum_total: Decimal,
    /// Number of transactions folded in.
    pub count: u64,
}

impl TransactionSummary {
    fn empty(account_number: Option<AccountNumber>) -> Self {
        Self {
            account_number,
            summary_date: Utc::now().date_naive(),
            sum_in: Decimal::ZERO,
            sum_out: Decimal::ZERO,
            sum_total: Decimal::ZERO,
            count: 0,
        }
    }
}

/// Pure fold over transactions. Holds constant state regardless of how many
/// transactions pass through.
#[derive(Debug, Clone)]
pub struct SummaryAccumulator {
    summary: TransactionSummary,
}

impl SummaryAccumulator {
    /// Start a session with zero totals.
    pub fn new() -> Self {
        Self {
            summary: TransactionSummary::empty(None),
        }
    }

    /// Start a session attributed to an account.
    pub fn for_account(account_number: AccountNumber) -> Self {
        Self {
            summary: TransactionSummary::empty(Some(account_number)),
        }
    }

    /// Fold one amount in. An unknown direction or an overflowing total fails
    /// and leaves the totals untouched.
    pub fn apply(
        &mut self,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> Result<&TransactionSummary> {
        let overflow = || BankError::Overflow(format!("summary total after adding {amount}"));
        let (sum_in, sum_out) = match transaction_type {
            TransactionType::In => (
                self.summary.sum_in.checked_add(amount).ok_or_else(overflow)?,
                self.summary.sum_out,
            ),
            TransactionType::Out => (
                self.summary.sum_in,
                self.summary.sum_out.checked_add(amount).ok_or_else(overflow)?,
            ),
            TransactionType::Unknown => return Err(BankError::UnknownTransactionType),
        };
        let sum_total = sum_in.checked_sub(sum_out).ok_or_else(overflow)?;

        self.summary.sum_in = sum_in;
        self.summary.sum_out = sum_out;
        self.summary.sum_total = sum_total;
        self.summary.count += 1;
        Ok(&self.summary)
    }

    /// Fold a transaction record in.
    pub fn apply_transaction(&mut self, transaction: &Transaction) -> Result<&TransactionSummary> {
        self.apply(transaction.transaction_type, transaction.amount)
    }

    /// Attribute the summary to `account_number`.
    pub fn record_account(&mut self, account_number: AccountNumber) {
        self.summary.account_number = Some(account_number);
    }

    /// Totals so far.
    pub fn summary(&self) -> &TransactionSummary {
        &self.summary
    }

    /// End the session and return the final totals.
    pub fn finish(self) -> TransactionSummary {
        self.summary
    }
}

impl Default for SummaryAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
