//! Metrics collection for coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::transfer_engine::TransferOutcome;

/// Coordinator metrics.
pub struct Metrics {
    /// Deposits and withdrawals posted.
    pub transactions_posted: AtomicU64,
    /// Deposits and withdrawals that failed.
    pub transactions_failed: AtomicU64,
    /// Total transfer requests.
    pub transfers_total: AtomicU64,
    /// Transfers that settled.
    pub transfers_settled: AtomicU64,
    /// Transfers recorded but not completed.
    pub transfers_failed: AtomicU64,
    /// Transfers rejected before any record was written.
    pub transfers_rejected: AtomicU64,
    /// Rates published.
    pub rates_published: AtomicU64,
    /// Rate lookups served.
    pub rate_lookups: AtomicU64,
    /// Rate lookups with no covering window.
    pub rate_lookups_not_found: AtomicU64,
    /// Summary sessions finished.
    pub summaries_completed: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            transactions_posted: AtomicU64::new(0),
            transactions_failed: AtomicU64::new(0),
            transfers_total: AtomicU64::new(0),
            transfers_settled: AtomicU64::new(0),
            transfers_failed: AtomicU64::new(0),
            transfers_rejected: AtomicU64::new(0),
            rates_published: AtomicU64::new(0),
            rate_lookups: AtomicU64::new(0),
            rate_lookups_not_found: AtomicU64::new(0),
            summaries_completed: AtomicU64::new(0),
        }
    }

    /// Record a posting attempt.
    pub fn transaction_posted(&self, success: bool) {
        if success {
            self.transactions_posted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.transactions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the result of a transfer request.
    pub fn transfer_completed<E>(&self, result: &Result<TransferOutcome, E>) {
        self.transfers_total.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(outcome) if outcome.is_success() => &self.transfers_settled,
            Ok(_) => &self.transfers_failed,
            Err(_) => &self.transfers_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published rate.
    pub fn rate_published(&self) {
        self.rates_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rate lookup.
    pub fn rate_lookup(&self, found: bool) {
        self.rate_lookups.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.rate_lookups_not_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finished summary session.
    pub fn summary_completed(&self) {
        self.summaries_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_posted: self.transactions_posted.load(Ordering::Relaxed),
            transactions_failed: self.transactions_failed.load(Ordering::Relaxed),
            transfers_total: self.transfers_total.load(Ordering::Relaxed),
            transfers_settled: self.transfers_settled.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            transfers_rejected: self.transfers_rejected.load(Ordering::Relaxed),
            rates_published: self.rates_published.load(Ordering::Relaxed),
            rate_lookups: self.rate_lookups.load(Ordering::Relaxed),
            rate_lookups_not_found: self.rate_lookups_not_found.load(Ordering::Relaxed),
            summaries_completed: self.summaries_completed.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("transactions_posted", "Deposits and withdrawals posted", snapshot.transactions_posted),
            ("transactions_failed", "Deposits and withdrawals that failed", snapshot.transactions_failed),
            ("transfers_total", "Total transfer requests", snapshot.transfers_total),
            ("transfers_settled", "Transfers settled", snapshot.transfers_settled),
            ("transfers_failed", "Transfers recorded but not completed", snapshot.transfers_failed),
            ("transfers_rejected", "Transfers rejected before recording", snapshot.transfers_rejected),
            ("rates_published", "Exchange rates published", snapshot.rates_published),
            ("rate_lookups", "Exchange rate lookups", snapshot.rate_lookups),
            ("rate_lookups_not_found", "Exchange rate lookups with no covering window", snapshot.rate_lookups_not_found),
            ("summaries_completed", "Transaction summary sessions finished", snapshot.summaries_completed),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP ledgerbank_{name} {help}\n# TYPE ledgerbank_{name} counter\nledgerbank_{name} {value}\n\n"
            ));
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_posted: u64,
    pub transactions_failed: u64,
    pub transfers_total: u64,
    pub transfers_settled: u64,
    pub transfers_failed: u64,
    pub transfers_rejected: u64,
    pub rates_published: u64,
    pub rate_lookups: u64,
    pub rate_lookups_not_found: u64,
    pub summaries_completed: u64,
}
