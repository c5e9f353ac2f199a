//! LedgerBank Common Types
//!
//! Shared types used across the LedgerBank core: identifiers, currencies,
//! the persisted records (accounts, transactions, transfers, exchange rates)
//! and the error type every component reports through.

pub mod identifiers;
pub mod monetary;
pub mod records;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use records::*;
pub use error::*;
pub use time::*;
