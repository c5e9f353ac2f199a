//! Transfer processing: durable intent, atomic leg pair, status update.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use ledgerbank_common::{
    validate_amount, AccountNumber, BankError, Currency, Result, Transfer, TransferId,
};
use ledgerbank_ledger::{AccountLedger, LedgerStore, LegPair};

/// Result of a transfer that got as far as recording its intent.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Both legs posted and the record marked successful.
    Settled(Transfer),
    /// The intent record exists but the transfer did not complete.
    Failed {
        /// Transfer as recorded; `success` is `false`.
        transfer: Transfer,
        /// Why the transfer did not complete.
        error: BankError,
    },
}

impl TransferOutcome {
    /// ID of the recorded transfer.
    pub fn transfer_id(&self) -> TransferId {
        self.transfer().id
    }

    /// The transfer record.
    pub fn transfer(&self) -> &Transfer {
        match self {
            TransferOutcome::Settled(transfer) => transfer,
            TransferOutcome::Failed { transfer, .. } => transfer,
        }
    }

    /// Whether the transfer settled.
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Settled(_))
    }

    /// Collapse into a `Result`, dropping the record of a failed attempt.
    pub fn into_result(self) -> Result<Transfer> {
        match self {
            TransferOutcome::Settled(transfer) => Ok(transfer),
            TransferOutcome::Failed { error, .. } => Err(error),
        }
    }
}

/// Moves funds between two accounts.
///
/// Protocol:
/// 1. Resolve both accounts. Nothing is written if either is missing.
/// 2. Record the transfer with `success = false`.
/// 3. Post both legs and both balance updates in one store transaction.
/// 4. Mark the transfer successful.
///
/// A failure in step 3 or 4 leaves the step-2 record in place with
/// `success = false`. Nothing is retried. Currency is recorded, never
/// converted.
#[derive(Clone)]
pub struct TransferEngine {
    ledger: AccountLedger,
    store: Arc<dyn LedgerStore>,
}

impl TransferEngine {
    /// Create a transfer engine.
    pub fn new(ledger: AccountLedger) -> Self {
        let store = ledger.store().clone();
        Self { ledger, store }
    }

    /// Transfer `amount` from one account to another.
    ///
    /// `Err` means the transfer was never attempted and no record exists.
    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    pub async fn transfer(
        &self,
        from: &AccountNumber,
        to: &AccountNumber,
        currency: Currency,
        amount: Decimal,
    ) -> Result<TransferOutcome> {
        validate_amount(amount)?;

        let source = self
            .ledger
            .find_account(from)
            .await?
            .ok_or_else(|| BankError::SourceAccountNotFound(from.clone()))?;
        let destination = self
            .ledger
            .find_account(to)
            .await?
            .ok_or_else(|| BankError::DestinationAccountNotFound(to.clone()))?;

        let mut transfer = Transfer::new(&source, &destination, currency, amount);
        if let Err(e) = self.store.insert_transfer(&transfer).await {
            warn!(error = %e, "Failed to record transfer intent");
            return Err(BankError::TransferRecordFailed {
                from: from.clone(),
                to: to.clone(),
                currency: transfer.currency,
                amount,
                source: e,
            });
        }

        info!(
            transfer_id = %transfer.id,
            amount = %amount,
            currency = %transfer.currency,
            "Transfer intent recorded"
        );

        let legs = LegPair::for_transfer(&transfer);
        if let Err(e) = self.ledger.post_leg_pair(&source, &destination, &legs).await {
            warn!(transfer_id = %transfer.id, error = %e, "Transfer legs rolled back");
            let error = BankError::TransferTransactionPairFailed {
                transfer_id: transfer.id,
                from: from.clone(),
                to: to.clone(),
                currency: transfer.currency.clone(),
                amount,
                source: e,
            };
            return Ok(TransferOutcome::Failed { transfer, error });
        }

        if let Err(e) = self.store.update_transfer_status(&transfer, true).await {
            // Legs are committed; the record needs manual reconciliation.
            error!(
                transfer_id = %transfer.id,
                error = %e,
                "Transfer posted but status update failed"
            );
            let error = BankError::TransferStatusUpdateFailed {
                transfer_id: transfer.id,
                source: e,
            };
            return Ok(TransferOutcome::Failed { transfer, error });
        }

        transfer.success = true;
        info!(transfer_id = %transfer.id, "Transfer settled");
        Ok(TransferOutcome::Settled(transfer))
    }

    /// Read a transfer record.
    pub async fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>> {
        Ok(self.store.find_transfer(id).await?)
    }
}
