//! LedgerBank Coordinator
//!
//! The coordinator owns the ledger store, the account ledger, the rate
//! catalog and the transfer engine, and exposes the request/response and
//! streaming operations the transport layer is built on.

pub mod config;
pub mod coordinator;
pub mod metrics;
pub mod session;
pub mod state;
pub mod transfer_engine;

pub use config::{CoordinatorConfig, LogFormat, RateFeedSettings};
pub use coordinator::{Coordinator, RateQuote, TransactionRequest, TransferRequest};
pub use metrics::{Metrics, MetricsSnapshot};
pub use session::SummarySession;
pub use state::CoordinatorState;
pub use transfer_engine::{TransferEngine, TransferOutcome};
