//! Memoized rate lookups.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use ledgerbank_common::{CurrencyPair, ExchangeRate, Timestamp};

/// Configuration for the rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Maximum number of cached lookups. Zero disables caching.
    pub max_entries: usize,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// Resolved lookups keyed by pair and instant.
///
/// A cached answer stays correct until a rate for the same pair is
/// published, so publishers must call [`RateCache::invalidate`]. Each pair
/// carries a generation bumped on invalidation; a lookup that raced with a
/// publish is not cached.
pub struct RateCache {
    entries: DashMap<(CurrencyPair, Timestamp), ExchangeRate>,
    generations: DashMap<CurrencyPair, u64>,
    config: RateCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RateCache {
    /// Create a new rate cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(RateCacheConfig::default())
    }

    /// Create a new rate cache with custom configuration.
    pub fn with_config(config: RateCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get the rate previously resolved for `pair` at `at`.
    pub fn get(&self, pair: &CurrencyPair, at: Timestamp) -> Option<ExchangeRate> {
        match self.entries.get(&(pair.clone(), at)) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(pair = %pair, "Cache hit");
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Current generation of `pair`. Read it before resolving a lookup.
    pub fn generation(&self, pair: &CurrencyPair) -> u64 {
        self.generations.get(pair).map(|g| *g).unwrap_or(0)
    }

    /// Remember that `pair` at `at` resolved to `rate`.
    pub fn insert(&self, at: Timestamp, rate: ExchangeRate) {
        if self.config.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.config.max_entries {
            self.make_room(Utc::now());
        }
        self.entries.insert((rate.pair.clone(), at), rate);
    }

    /// Like [`RateCache::insert`], but only if no invalidation happened
    /// since `generation` was read. Returns whether the rate was cached.
    pub fn insert_if_current(&self, at: Timestamp, rate: ExchangeRate, generation: u64) -> bool {
        // Holding the generation entry blocks a concurrent invalidate.
        let current = self.generations.entry(rate.pair.clone()).or_insert(0);
        if self.config.max_entries == 0 || *current != generation {
            return false;
        }
        self.insert(at, rate);
        drop(current);
        true
    }

    /// Drop every entry for `pair`.
    pub fn invalidate(&self, pair: &CurrencyPair) {
        *self.generations.entry(pair.clone()).or_insert(0) += 1;
        self.entries.retain(|(cached, _), _| cached != pair);
    }

    /// Drop entries whose rate window ended before `now`.
    pub fn evict_ended(&self, now: Timestamp) {
        self.entries.retain(|_, rate| rate.valid_to >= now);
    }

    /// Evict ended windows, then the earliest lookup instants, until a
    /// quarter of the capacity is free.
    fn make_room(&self, now: Timestamp) {
        self.evict_ended(now);

        let max = self.config.max_entries;
        let target = max - (max / 4).max(1);
        let excess = self.entries.len().saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut keys: Vec<(CurrencyPair, Timestamp)> =
            self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort_by_key(|(_, at)| *at);
        for key in keys.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        debug!(evicted = excess, "Rate cache trimmed");
    }

    /// Get the number of entries in cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}
