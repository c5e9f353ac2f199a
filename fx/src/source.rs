//! Rate sources feeding the periodic publisher.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::debug;

use ledgerbank_common::{BankError, CurrencyPair, Result};

/// Produces the next rate value for a currency pair.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Get the next rate for `pair`.
    async fn next_rate(&self, pair: &CurrencyPair) -> Result<Decimal>;
}

/// Synthetic source: `base` plus a uniformly drawn whole number in
/// `[0, spread)`.
pub struct JitteredRateSource {
    base: Decimal,
    spread: u32,
    rng: Mutex<StdRng>,
}

impl JitteredRateSource {
    /// Create a source seeded from OS entropy.
    pub fn new(base: Decimal, spread: u32) -> Self {
        Self {
            base,
            spread,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a reproducible source.
    pub fn with_seed(base: Decimal, spread: u32, seed: u64) -> Self {
        Self {
            base,
            spread,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl RateSource for JitteredRateSource {
    fn name(&self) -> &str {
        "JITTERED"
    }

    async fn next_rate(&self, pair: &CurrencyPair) -> Result<Decimal> {
        let jitter = if self.spread == 0 {
            0
        } else {
            self.rng.lock().gen_range(0..self.spread)
        };
        let rate = self.base + Decimal::from(jitter);
        debug!(pair = %pair, rate = %rate, "Generated rate");
        Ok(rate)
    }
}

/// Source returning preset rates per pair.
#[derive(Default)]
pub struct FixedRateSource {
    rates: DashMap<CurrencyPair, Decimal>,
}

impl FixedRateSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rate returned for a pair.
    pub fn set_rate(&self, pair: CurrencyPair, rate: Decimal) {
        self.rates.insert(pair, rate);
    }
}

#[async_trait]
impl RateSource for FixedRateSource {
    fn name(&self) -> &str {
        "FIXED"
    }

    async fn next_rate(&self, pair: &CurrencyPair) -> Result<Decimal> {
        self.rates
            .get(pair)
            .map(|r| *r)
            .ok_or_else(|| BankError::InvalidRate {
                pair: pair.clone(),
                reason: "no rate configured".into(),
            })
    }
}
