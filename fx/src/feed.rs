//! Periodic rate publication.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument};

use ledgerbank_common::{
    constants, feed_window, now, CurrencyPair, DurationExt, RateId, Result, Timestamp,
};

use crate::catalog::RateCatalog;
use crate::source::RateSource;

/// Configuration for a rate feed.
#[derive(Debug, Clone)]
pub struct RateFeedConfig {
    /// Pair to publish.
    pub pair: CurrencyPair,
    /// Time between publications; also the length of each window.
    pub interval: Duration,
    /// Delay between the tick's second and the start of its window.
    pub lead: Duration,
}

impl Default for RateFeedConfig {
    fn default() -> Self {
        Self {
            pair: CurrencyPair::new("USD", "INR"),
            interval: constants::rate_feed_interval(),
            lead: constants::rate_feed_lead(),
        }
    }
}

/// Publishes one rate per interval through the catalog.
///
/// Each rate is valid from `lead` after the current second for exactly one
/// interval, so consecutive windows abut without overlapping. Failed
/// publishes are logged and skipped.
pub struct RateFeed {
    catalog: Arc<RateCatalog>,
    source: Arc<dyn RateSource>,
    config: RateFeedConfig,
}

impl RateFeed {
    /// Create a feed.
    pub fn new(
        catalog: Arc<RateCatalog>,
        source: Arc<dyn RateSource>,
        config: RateFeedConfig,
    ) -> Self {
        Self {
            catalog,
            source,
            config,
        }
    }

    /// Publish the rate for the tick at `at`.
    #[instrument(skip(self), fields(pair = %self.config.pair, source = self.source.name()))]
    pub async fn publish_at(&self, at: Timestamp) -> Result<RateId> {
        let rate = self.source.next_rate(&self.config.pair).await?;
        let (valid_from, valid_to) = feed_window(at, self.config.lead, self.config.interval);
        self.catalog
            .publish(self.config.pair.clone(), rate, valid_from, valid_to)
            .await
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval.as_std());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            pair = %self.config.pair,
            interval_ms = self.config.interval.num_milliseconds(),
            "Rate feed started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_at(now()).await {
                        error!(pair = %self.config.pair, error = %e, "Rate feed publish failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(pair = %self.config.pair, "Rate feed stopped");
    }

    /// Spawn [`RateFeed::run`] on the runtime.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
