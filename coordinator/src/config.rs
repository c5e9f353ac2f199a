//! Coordinator configuration.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use ledgerbank_common::{constants, BankError, Currency, CurrencyPair, DurationExt, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    Text,
}

impl FromStr for LogFormat {
    type Err = BankError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "plain" => Ok(LogFormat::Text),
            other => Err(BankError::Configuration(format!(
                "unknown log format {other:?}"
            ))),
        }
    }
}

/// Periodic rate feed configuration.
#[derive(Debug, Clone)]
pub struct RateFeedSettings {
    /// Whether the coordinator runs the feed.
    pub enabled: bool,
    /// Currency converted from.
    pub from: Currency,
    /// Currency converted to.
    pub to: Currency,
    /// Publication interval, also the length of each validity window.
    /// Whole seconds, since windows start on a second boundary.
    pub interval: Duration,
    /// Lowest generated rate.
    pub base: Decimal,
    /// Width of the band above `base` that generated rates fall in.
    pub spread: u32,
}

impl RateFeedSettings {
    /// Pair the feed publishes.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.from.clone(), self.to.clone())
    }
}

impl Default for RateFeedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            from: Currency::usd(),
            to: Currency::inr(),
            interval: constants::rate_feed_interval().as_std(),
            base: Decimal::from(2000),
            spread: 300,
        }
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Database URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Maximum pooled database connections.
    pub database_max_connections: u32,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Rate feed configuration.
    pub rate_feed: RateFeedSettings,
    /// Interval between quotes on a rate stream.
    pub rate_stream_interval: Duration,
    /// Whether rate lookups are memoized.
    pub rate_cache_enabled: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            rate_feed: RateFeedSettings::default(),
            rate_stream_interval: constants::rate_stream_interval().as_std(),
            rate_cache_enabled: true,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from `lookup`, falling back to defaults for
    /// missing keys. Unparsable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            config.database_url = Some(url);
        }
        if let Some(n) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.database_max_connections = parse("DATABASE_MAX_CONNECTIONS", &n)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_format = format.parse()?;
        }

        if let Some(enabled) = lookup("RATE_FEED_ENABLED") {
            config.rate_feed.enabled = parse("RATE_FEED_ENABLED", &enabled)?;
        }
        if let Some(from) = lookup("RATE_FEED_FROM") {
            config.rate_feed.from = Currency::new(from.trim());
        }
        if let Some(to) = lookup("RATE_FEED_TO") {
            config.rate_feed.to = Currency::new(to.trim());
        }
        if let Some(ms) = lookup("RATE_FEED_INTERVAL_MS") {
            config.rate_feed.interval = Duration::from_millis(parse("RATE_FEED_INTERVAL_MS", &ms)?);
        }
        if let Some(base) = lookup("RATE_FEED_BASE") {
            config.rate_feed.base = parse("RATE_FEED_BASE", &base)?;
        }
        if let Some(spread) = lookup("RATE_FEED_SPREAD") {
            config.rate_feed.spread = parse("RATE_FEED_SPREAD", &spread)?;
        }

        if let Some(ms) = lookup("RATE_STREAM_INTERVAL_MS") {
            config.rate_stream_interval =
                Duration::from_millis(parse("RATE_STREAM_INTERVAL_MS", &ms)?);
        }
        if let Some(enabled) = lookup("RATE_CACHE_ENABLED") {
            config.rate_cache_enabled = parse("RATE_CACHE_ENABLED", &enabled)?;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database_max_connections == 0 {
            return Err(invalid("database max connections must be at least 1"));
        }

        if self.rate_stream_interval.is_zero() {
            return Err(invalid("rate stream interval cannot be 0"));
        }

        let feed = &self.rate_feed;
        if feed.interval.is_zero() {
            return Err(invalid("rate feed interval cannot be 0"));
        }
        if feed.interval.subsec_nanos() != 0 {
            return Err(invalid("rate feed interval must be whole seconds"));
        }
        if !feed.from.is_valid() || !feed.to.is_valid() {
            return Err(invalid("rate feed currencies must be three-letter codes"));
        }
        if feed.from == feed.to {
            return Err(invalid("rate feed currencies must differ"));
        }
        if feed.base <= Decimal::ZERO {
            return Err(invalid("rate feed base must be positive"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> BankError {
    BankError::Configuration(message.to_string())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BankError::Configuration(format!("{key}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.database_url.is_none());
        assert_eq!(config.rate_feed.pair(), CurrencyPair::new("USD", "INR"));
    }

    #[test]
    fn test_overrides() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/ledgerbank"),
            ("LOG_FORMAT", "text"),
            ("RATE_FEED_ENABLED", "false"),
            ("RATE_FEED_FROM", "eur"),
            ("RATE_FEED_INTERVAL_MS", "2000"),
            ("RATE_FEED_BASE", "83.5"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ledgerbank"));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(!config.rate_feed.enabled);
        assert_eq!(config.rate_feed.from, Currency::eur());
        assert_eq!(config.rate_feed.interval, Duration::from_secs(2));
        assert_eq!(config.rate_feed.base, Decimal::new(835, 1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_value() {
        let result = CoordinatorConfig::from_lookup(lookup_from(&[("RATE_FEED_SPREAD", "-3")]));
        assert!(matches!(result, Err(BankError::Configuration(_))));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CoordinatorConfig::default();
        config.rate_feed.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.rate_feed.interval = Duration::from_millis(1_500);
        assert!(matches!(config.validate(), Err(BankError::Configuration(_))));

        let mut config = CoordinatorConfig::default();
        config.rate_feed.to = Currency::usd();
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.database_max_connections = 0;
        assert!(config.validate().is_err());
    }
}
