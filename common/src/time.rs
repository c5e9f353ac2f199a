//! Time utilities for LedgerBank.

use chrono::{DateTime, Duration, DurationRound, Utc};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Rate-feed timing defaults.
pub mod constants {
    use super::Duration;

    /// Interval between generated exchange rates (5 seconds).
    pub fn rate_feed_interval() -> Duration {
        Duration::seconds(5)
    }

    /// How far ahead of the current second a generated rate becomes valid.
    pub fn rate_feed_lead() -> Duration {
        Duration::seconds(3)
    }

    /// Interval between quotes on a rate stream (5 seconds).
    pub fn rate_stream_interval() -> Duration {
        Duration::seconds(5)
    }
}

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Drop sub-second precision.
pub fn truncate_to_second(ts: Timestamp) -> Timestamp {
    ts.duration_trunc(Duration::seconds(1)).unwrap_or(ts)
}

/// Validity window `[from, to]` of a rate fed every `interval`, starting
/// `lead` after the second containing `at`. Consecutive windows do not
/// overlap: each ends one millisecond before the next one starts.
pub fn feed_window(at: Timestamp, lead: Duration, interval: Duration) -> (Timestamp, Timestamp) {
    let valid_from = truncate_to_second(at) + lead;
    let valid_to = valid_from + interval - Duration::milliseconds(1);
    (valid_from, valid_to)
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_truncate_to_second() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap() + Duration::milliseconds(750);
        let truncated = truncate_to_second(ts);
        assert_eq!(truncated.second(), 5);
        assert_eq!(truncated.nanosecond(), 0);
    }

    #[test]
    fn test_feed_window() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::milliseconds(400);
        let (from, to) = feed_window(at, Duration::seconds(3), Duration::seconds(5));

        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 3).unwrap());
        assert_eq!(
            to,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 7).unwrap() + Duration::milliseconds(999)
        );
    }

    #[test]
    fn test_consecutive_feed_windows_do_not_overlap() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let interval = Duration::seconds(5);
        let (_, first_to) = feed_window(at, Duration::seconds(3), interval);
        let (second_from, _) = feed_window(at + interval, Duration::seconds(3), interval);
        assert!(first_to < second_from);
    }

    #[test]
    fn test_duration_as_std() {
        assert_eq!(Duration::seconds(2).as_std(), std::time::Duration::from_secs(2));
        assert_eq!(Duration::seconds(-2).as_std(), std::time::Duration::ZERO);
    }
}
