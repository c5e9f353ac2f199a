//! LedgerBank Account Ledger
//!
//! The ledger store contract with in-memory and PostgreSQL implementations,
//! the account ledger that owns every balance mutation, and the summary
//! accumulator used by streaming ingestion.

pub mod balance;
pub mod engine;
pub mod journal;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod summary;

pub use balance::Balance;
pub use engine::AccountLedger;
pub use journal::LegPair;
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;
pub use store::{LedgerStore, StoreOperation, StoreResult};
pub use summary::{SummaryAccumulator, TransactionSummary};
