//! Streaming summarization sessions.

use tracing::{debug, info};

use ledgerbank_common::{AccountNumber, BankError, Result};
use ledgerbank_ledger::{SummaryAccumulator, TransactionSummary};

use crate::coordinator::{Coordinator, TransactionRequest};

/// One summarization session: every fed transaction is posted to the
/// ledger, then folded into running totals.
///
/// Feeding is sequential. A failed feed leaves the totals as they were;
/// transactions already posted stay posted whether or not the session is
/// finished. Dropping the session cancels it.
pub struct SummarySession<'a> {
    coordinator: &'a Coordinator,
    accumulator: SummaryAccumulator,
}

impl<'a> SummarySession<'a> {
    pub(crate) fn new(coordinator: &'a Coordinator, account_number: Option<AccountNumber>) -> Self {
        let accumulator = match account_number {
            Some(number) => SummaryAccumulator::for_account(number),
            None => SummaryAccumulator::new(),
        };
        Self {
            coordinator,
            accumulator,
        }
    }

    /// Post `request` and fold it into the totals.
    pub async fn feed(&mut self, request: TransactionRequest) -> Result<TransactionSummary> {
        let account_number = request.account_number.clone();
        let (transaction_type, amount) = (request.transaction_type, request.amount);

        // Refuse an overflowing total before anything is posted.
        let mut next = self.accumulator.clone();
        let folded = next.apply(transaction_type, amount).map(|_| ());
        if let Err(error @ BankError::Overflow(_)) = folded {
            return Err(error);
        }

        self.coordinator.post_transaction(request).await?;

        next.record_account(account_number);
        self.accumulator = next;
        debug!(count = self.accumulator.summary().count, "Transaction summarized");
        Ok(self.accumulator.summary().clone())
    }

    /// Totals so far.
    pub fn summary(&self) -> &TransactionSummary {
        self.accumulator.summary()
    }

    /// End the session and return the final totals.
    pub fn finish(self) -> TransactionSummary {
        let summary = self.accumulator.finish();
        self.coordinator.metrics().summary_completed();
        info!(
            count = summary.count,
            sum_in = %summary.sum_in,
            sum_out = %summary.sum_out,
            sum_total = %summary.sum_total,
            "Summary finished"
        );
        summary
    }
}
