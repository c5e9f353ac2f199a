//! Transfer leg pairs.

use ledgerbank_common::{Transaction, TransactionType, Transfer, TransferId};
use rust_decimal::Decimal;

/// The two legs of a transfer, posted together or not at all.
#[derive(Debug, Clone)]
pub struct LegPair {
    /// Transfer both legs belong to.
    pub transfer_id: TransferId,
    /// `out` leg on the source account.
    pub out_leg: Transaction,
    /// `in` leg on the destination account.
    pub in_leg: Transaction,
}

impl LegPair {
    /// Build both legs for a transfer.
    pub fn for_transfer(transfer: &Transfer) -> Self {
        Self {
            transfer_id: transfer.id,
            out_leg: Transaction::transfer_out(transfer),
            in_leg: Transaction::transfer_in(transfer),
        }
    }

    /// Check the pair moves the same positive amount out of one account and
    /// into another, and that both legs reference the transfer.
    pub fn is_balanced(&self) -> bool {
        self.out_leg.transaction_type == TransactionType::Out
            && self.in_leg.transaction_type == TransactionType::In
            && self.out_leg.amount == self.in_leg.amount
            && self.out_leg.amount > Decimal::ZERO
            && self.out_leg.transfer_id == Some(self.transfer_id)
            && self.in_leg.transfer_id == Some(self.transfer_id)
    }
}
