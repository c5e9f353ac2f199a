//! Error types for LedgerBank operations.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AccountNumber, Currency, CurrencyPair, Timestamp, TransferId};

/// Failure reported by a ledger store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The addressed record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The underlying database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(String),

    /// A uniqueness or consistency constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Failure injected by a test double.
    #[error("injected failure in {0}")]
    Injected(&'static str),
}

/// Main error type for LedgerBank core operations.
#[derive(Error, Debug)]
pub enum BankError {
    /// No account with this number.
    #[error("account {0} not found")]
    AccountNotFound(AccountNumber),

    /// Transfer source account does not exist.
    #[error("source account (from {0}) not found")]
    SourceAccountNotFound(AccountNumber),

    /// Transfer destination account does not exist.
    #[error("destination account (to {0}) not found")]
    DestinationAccountNotFound(AccountNumber),

    /// No published rate covers the requested instant.
    #[error("no {pair} rate valid at {at}")]
    RateNotFound { pair: CurrencyPair, at: Timestamp },

    /// Transaction direction is neither `in` nor `out`.
    #[error("unknown transaction type")]
    UnknownTransactionType,

    /// Amounts must be strictly positive with at most
    /// [`AMOUNT_SCALE`](crate::AMOUNT_SCALE) decimal places.
    #[error("invalid amount {0}: must be positive with at most 8 decimal places")]
    InvalidAmount(Decimal),

    /// A running total left the representable range.
    #[error("amount overflow: {0}")]
    Overflow(String),

    /// Rate value or validity window rejected on publish.
    #[error("invalid rate for {pair}: {reason}")]
    InvalidRate { pair: CurrencyPair, reason: String },

    /// The transfer intent could not be recorded; nothing was attempted.
    #[error("failed to record transfer from {from} to {to} of {amount} {currency}")]
    TransferRecordFailed {
        from: AccountNumber,
        to: AccountNumber,
        currency: Currency,
        amount: Decimal,
        #[source]
        source: StorageError,
    },

    /// The leg pair was rolled back; the transfer record stays unsuccessful.
    #[error("transfer {transfer_id} from {from} to {to} of {amount} {currency} failed to post")]
    TransferTransactionPairFailed {
        transfer_id: TransferId,
        from: AccountNumber,
        to: AccountNumber,
        currency: Currency,
        amount: Decimal,
        #[source]
        source: StorageError,
    },

    /// Both legs committed but the success flag could not be written.
    #[error("transfer {transfer_id} posted but its status could not be updated")]
    TransferStatusUpdateFailed {
        transfer_id: TransferId,
        #[source]
        source: StorageError,
    },

    /// The service is shutting down and refuses new writes.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Any other persistence failure.
    #[error("storage error")]
    Storage(#[from] StorageError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BankError {
    /// Whether the error was detected before any durable write.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            BankError::AccountNotFound(_)
                | BankError::SourceAccountNotFound(_)
                | BankError::DestinationAccountNotFound(_)
                | BankError::UnknownTransactionType
                | BankError::InvalidAmount(_)
                | BankError::Overflow(_)
                | BankError::InvalidRate { .. }
                | BankError::ServiceUnavailable(_)
        )
    }

    /// Get error code for the transport layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            BankError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            BankError::SourceAccountNotFound(_) => "SOURCE_ACCOUNT_NOT_FOUND",
            BankError::DestinationAccountNotFound(_) => "DESTINATION_ACCOUNT_NOT_FOUND",
            BankError::RateNotFound { .. } => "RATE_NOT_FOUND",
            BankError::UnknownTransactionType => "UNKNOWN_TRANSACTION_TYPE",
            BankError::InvalidAmount(_) => "INVALID_AMOUNT",
            BankError::Overflow(_) => "AMOUNT_OVERFLOW",
            BankError::InvalidRate { .. } => "INVALID_RATE",
            BankError::TransferRecordFailed { .. } => "TRANSFER_RECORD_FAILED",
            BankError::TransferTransactionPairFailed { .. } => "TRANSACTION_PAIR_FAILED",
            BankError::TransferStatusUpdateFailed { .. } => "TRANSFER_STATUS_UPDATE_FAILED",
            BankError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            BankError::Storage(_) => "STORAGE_ERROR",
            BankError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for LedgerBank operations.
pub type Result<T> = std::result::Result<T, BankError>;
