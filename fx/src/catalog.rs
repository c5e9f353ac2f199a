//! Rate catalog: exchange rates looked up by validity window.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use ledgerbank_common::{
    BankError, CurrencyPair, ExchangeRate, RateId, Result, Timestamp, AMOUNT_SCALE,
};
use ledgerbank_ledger::LedgerStore;

use crate::cache::{CacheStats, RateCache, RateCacheConfig};

/// Configuration for the rate catalog.
#[derive(Debug, Clone)]
pub struct RateCatalogConfig {
    /// Cache configuration.
    pub cache: RateCacheConfig,
    /// Whether to use cached lookups.
    pub use_cache: bool,
}

impl Default for RateCatalogConfig {
    fn default() -> Self {
        Self {
            cache: RateCacheConfig::default(),
            use_cache: true,
        }
    }
}

/// Append-only exchange-rate history with window lookups.
///
/// Windows are inclusive at both ends. When windows overlap, the most
/// recently published rate wins. Overlap is not rejected on publish.
pub struct RateCatalog {
    store: Arc<dyn LedgerStore>,
    cache: RateCache,
    config: RateCatalogConfig,
}

impl RateCatalog {
    /// Create a catalog over `store`.
    pub fn new(store: Arc<dyn LedgerStore>, config: RateCatalogConfig) -> Self {
        Self {
            store,
            cache: RateCache::with_config(config.cache.clone()),
            config,
        }
    }

    /// Find the rate for `pair` whose window contains `at`.
    #[instrument(skip(self, pair), fields(pair = %pair))]
    pub async fn lookup(&self, pair: &CurrencyPair, at: Timestamp) -> Result<ExchangeRate> {
        if self.config.use_cache {
            if let Some(cached) = self.cache.get(pair, at) {
                return Ok(cached);
            }
        }

        let generation = self.cache.generation(pair);
        let rate = self
            .store
            .find_exchange_rate(pair, at)
            .await?
            .ok_or_else(|| BankError::RateNotFound {
                pair: pair.clone(),
                at,
            })?;

        if self.config.use_cache && !self.cache.insert_if_current(at, rate.clone(), generation) {
            debug!("Rate published during lookup; not cached");
        }
        Ok(rate)
    }

    /// Append a rate valid over `[valid_from, valid_to]`.
    #[instrument(skip(self, pair), fields(pair = %pair))]
    pub async fn publish(
        &self,
        pair: CurrencyPair,
        rate: Decimal,
        valid_from: Timestamp,
        valid_to: Timestamp,
    ) -> Result<RateId> {
        Self::validate(&pair, rate, valid_from, valid_to)?;

        let record = ExchangeRate::new(pair, rate, valid_from, valid_to);
        let id = self.store.insert_exchange_rate(&record).await.map_err(|e| {
            warn!(error = %e, "Failed to publish rate");
            BankError::from(e)
        })?;
        self.cache.invalidate(&record.pair);

        info!(
            rate_id = %id,
            rate = %rate,
            valid_from = %valid_from,
            valid_to = %valid_to,
            "Rate published"
        );
        Ok(id)
    }

    /// Lookup cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn validate(
        pair: &CurrencyPair,
        rate: Decimal,
        valid_from: Timestamp,
        valid_to: Timestamp,
    ) -> Result<()> {
        let reason = if !pair.from.is_valid() || !pair.to.is_valid() {
            "currency codes must be three letters"
        } else if rate <= Decimal::ZERO {
            "rate must be positive"
        } else if rate.normalize().scale() > AMOUNT_SCALE {
            "rate has more than 8 decimal places"
        } else if valid_from > valid_to {
            "window ends before it starts"
        } else {
            return Ok(());
        };

        Err(BankError::InvalidRate {
            pair: pair.clone(),
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ledgerbank_ledger::{InMemoryLedgerStore, StoreOperation};
    use rust_decimal_macros::dec;

    fn setup(use_cache: bool) -> (Arc<InMemoryLedgerStore>, RateCatalog) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let config = RateCatalogConfig {
            use_cache,
            ..Default::default()
        };
        let catalog = RateCatalog::new(store.clone(), config);
        (store, catalog)
    }

    fn usd_inr() -> CurrencyPair {
        CurrencyPair::new("USD", "INR")
    }

    #[tokio::test]
    async fn test_lookup_by_window() {
        let (_, catalog) = setup(true);
        let t0 = Utc::now();
        let first_end = t0 + Duration::seconds(5) - Duration::milliseconds(1);
        let second_start = t0 + Duration::seconds(5);

        catalog.publish(usd_inr(), dec!(2100), t0, first_end).await.unwrap();
        catalog
            .publish(usd_inr(), dec!(2200), second_start, second_start + Duration::seconds(5))
            .await
            .unwrap();

        assert_eq!(catalog.lookup(&usd_inr(), t0).await.unwrap().rate, dec!(2100));
        assert_eq!(catalog.lookup(&usd_inr(), first_end).await.unwrap().rate, dec!(2100));
        assert_eq!(catalog.lookup(&usd_inr(), second_start).await.unwrap().rate, dec!(2200));
    }

    #[tokio::test]
    async fn test_outside_every_window_is_not_found() {
        let (_, catalog) = setup(true);
        let t0 = Utc::now();
        catalog
            .publish(usd_inr(), dec!(2100), t0, t0 + Duration::seconds(5))
            .await
            .unwrap();

        let before = t0 - Duration::milliseconds(1);
        assert!(matches!(
            catalog.lookup(&usd_inr(), before).await,
            Err(BankError::RateNotFound { at, .. }) if at == before
        ));
        assert!(matches!(
            catalog.lookup(&usd_inr().inverse(), t0).await,
            Err(BankError::RateNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_invalidates_cached_answer() {
        let (_, catalog) = setup(true);
        let t0 = Utc::now();
        let at = t0 + Duration::seconds(1);
        catalog
            .publish(usd_inr(), dec!(2100), t0, t0 + Duration::seconds(10))
            .await
            .unwrap();

        assert_eq!(catalog.lookup(&usd_inr(), at).await.unwrap().rate, dec!(2100));
        assert_eq!(catalog.lookup(&usd_inr(), at).await.unwrap().rate, dec!(2100));
        assert_eq!(catalog.cache_stats().hits, 1);

        // Overlapping window published later wins.
        catalog
            .publish(usd_inr(), dec!(2150), t0, t0 + Duration::seconds(2))
            .await
            .unwrap();
        assert_eq!(catalog.lookup(&usd_inr(), at).await.unwrap().rate, dec!(2150));
    }

    #[tokio::test]
    async fn test_repeated_lookups_identical() {
        for use_cache in [true, false] {
            let (_, catalog) = setup(use_cache);
            let t0 = Utc::now();
            catalog
                .publish(usd_inr(), dec!(2100), t0, t0 + Duration::seconds(5))
                .await
                .unwrap();

            let first = catalog.lookup(&usd_inr(), t0).await.unwrap();
            let second = catalog.lookup(&usd_inr(), t0).await.unwrap();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_publish_validation() {
        let (store, catalog) = setup(true);
        let t0 = Utc::now();

        assert!(matches!(
            catalog.publish(usd_inr(), dec!(0), t0, t0).await,
            Err(BankError::InvalidRate { .. })
        ));
        assert!(matches!(
            catalog
                .publish(usd_inr(), dec!(2100), t0, t0 - Duration::seconds(1))
                .await,
            Err(BankError::InvalidRate { .. })
        ));
        assert!(matches!(
            catalog
                .publish(CurrencyPair::new("US", "INR"), dec!(2100), t0, t0)
                .await,
            Err(BankError::InvalidRate { .. })
        ));
        assert!(matches!(
            catalog
                .publish(usd_inr(), dec!(83.123456789), t0, t0)
                .await,
            Err(BankError::InvalidRate { .. })
        ));
        assert_eq!(store.rate_count(), 0);

        // A single-instant window is valid.
        catalog.publish(usd_inr(), dec!(2100), t0, t0).await.unwrap();
        assert_eq!(store.rate_count(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_on_publish() {
        let (store, catalog) = setup(true);
        store.inject_fault(StoreOperation::InsertExchangeRate);
        let t0 = Utc::now();

        assert!(matches!(
            catalog.publish(usd_inr(), dec!(2100), t0, t0).await,
            Err(BankError::Storage(_))
        ));
    }
}
