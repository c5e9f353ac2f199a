//! LedgerBank Rate Catalog
//!
//! Exchange rates are append-only and looked up by validity window, never
//! by "latest value".
//!
//! # Features
//!
//! - Inclusive window lookups with a most-recently-published tie-break
//! - Memoized lookups invalidated on publish
//! - Pluggable rate sources
//! - A periodic feed task publishing abutting windows
//!
//! # Example
//!
//! ```rust,ignore
//! use ledgerbank_fx::{RateCatalog, RateCatalogConfig};
//! use ledgerbank_common::{now, CurrencyPair};
//!
//! let catalog = RateCatalog::new(store, RateCatalogConfig::default());
//! let rate = catalog.lookup(&CurrencyPair::new("USD", "INR"), now()).await?;
//! ```

pub mod cache;
pub mod catalog;
pub mod feed;
pub mod source;

pub use cache::{CacheStats, RateCache, RateCacheConfig};
pub use catalog::{RateCatalog, RateCatalogConfig};
pub use feed::{RateFeed, RateFeedConfig};
pub use source::{FixedRateSource, JitteredRateSource, RateSource};
