//! Core coordinator implementation.

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, instrument, warn};

use ledgerbank_common::{
    constants, now, truncate_to_second, AccountNumber, BankError, Currency, CurrencyPair,
    ExchangeRate, RateId, Result, Timestamp, Transaction, TransactionId, TransactionType, Transfer,
    TransferId,
};
use ledgerbank_fx::{
    CacheStats, JitteredRateSource, RateCatalog, RateCatalogConfig, RateFeed, RateFeedConfig,
    RateSource,
};
use ledgerbank_ledger::{
    AccountLedger, Balance, InMemoryLedgerStore, LedgerStore, TransactionSummary,
};

use crate::config::CoordinatorConfig;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::session::SummarySession;
use crate::state::CoordinatorState;
use crate::transfer_engine::{TransferEngine, TransferOutcome};

/// Deposit or withdrawal request.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    /// Account to post to.
    pub account_number: AccountNumber,
    /// `in` for a deposit, `out` for a withdrawal.
    pub transaction_type: TransactionType,
    /// Positive amount.
    pub amount: Decimal,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl TransactionRequest {
    /// A deposit of `amount`.
    pub fn deposit(account_number: impl Into<AccountNumber>, amount: Decimal) -> Self {
        Self {
            account_number: account_number.into(),
            transaction_type: TransactionType::In,
            amount,
            notes: None,
        }
    }

    /// A withdrawal of `amount`.
    pub fn withdrawal(account_number: impl Into<AccountNumber>, amount: Decimal) -> Self {
        Self {
            account_number: account_number.into(),
            transaction_type: TransactionType::Out,
            amount,
            notes: None,
        }
    }

    /// Attach notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Transfer request.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Source account.
    pub from: AccountNumber,
    /// Destination account.
    pub to: AccountNumber,
    /// Currency recorded on the transfer.
    pub currency: Currency,
    /// Positive amount.
    pub amount: Decimal,
}

impl TransferRequest {
    /// Create a transfer request.
    pub fn new(
        from: impl Into<AccountNumber>,
        to: impl Into<AccountNumber>,
        currency: impl Into<Currency>,
        amount: Decimal,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            currency: currency.into(),
            amount,
        }
    }
}

/// A rate as seen by a rate stream at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateQuote {
    /// ID of the rate record.
    pub rate_id: RateId,
    /// Currency pair.
    pub pair: CurrencyPair,
    /// Conversion rate.
    pub rate: Decimal,
    /// Instant the lookup was made for.
    pub at: Timestamp,
    /// Start of the rate's window.
    pub valid_from: Timestamp,
    /// End of the rate's window.
    pub valid_to: Timestamp,
}

impl RateQuote {
    fn new(rate: ExchangeRate, at: Timestamp) -> Self {
        Self {
            rate_id: rate.id,
            pair: rate.pair,
            rate: rate.rate,
            at,
            valid_from: rate.valid_from,
            valid_to: rate.valid_to,
        }
    }
}

/// The coordinator: owns the store, ledger, rate catalog, transfer engine
/// and the rate feed, and serves every upward operation.
pub struct Coordinator {
    /// Configuration.
    config: CoordinatorConfig,
    /// Current coordinator state.
    state: Arc<RwLock<CoordinatorState>>,
    /// Account ledger.
    ledger: AccountLedger,
    /// Rate catalog.
    catalog: Arc<RateCatalog>,
    /// Transfer engine.
    transfers: TransferEngine,
    /// Source the rate feed draws from.
    rate_source: Arc<dyn RateSource>,
    /// Metrics.
    metrics: Arc<Metrics>,
    /// Shutdown signal for background tasks.
    shutdown_tx: watch::Sender<bool>,
    /// Running rate feed, if any.
    feed_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator over `store`, generating feed rates from the
    /// configured base and spread.
    pub fn new(config: CoordinatorConfig, store: Arc<dyn LedgerStore>) -> Self {
        let source = Arc::new(JitteredRateSource::new(
            config.rate_feed.base,
            config.rate_feed.spread,
        ));
        Self::with_rate_source(config, store, source)
    }

    /// Create a coordinator over a fresh in-memory store.
    pub fn in_memory(config: CoordinatorConfig) -> (Self, Arc<InMemoryLedgerStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        (Self::new(config, store.clone()), store)
    }

    /// Create a coordinator whose rate feed draws from `rate_source`.
    pub fn with_rate_source(
        config: CoordinatorConfig,
        store: Arc<dyn LedgerStore>,
        rate_source: Arc<dyn RateSource>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        let ledger = AccountLedger::new(store.clone());
        let catalog = Arc::new(RateCatalog::new(
            store,
            RateCatalogConfig {
                use_cache: config.rate_cache_enabled,
                ..RateCatalogConfig::default()
            },
        ));
        let transfers = TransferEngine::new(ledger.clone());

        Self {
            config,
            state: Arc::new(RwLock::new(CoordinatorState::Starting)),
            ledger,
            catalog,
            transfers,
            rate_source,
            metrics: Arc::new(Metrics::new()),
            shutdown_tx,
            feed_handle: Mutex::new(None),
        }
    }

    /// Start the coordinator and its rate feed.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        match self.state() {
            CoordinatorState::Starting => {}
            CoordinatorState::Running => return Ok(()),
            state => {
                return Err(BankError::ServiceUnavailable(format!(
                    "cannot start a coordinator that is {state}"
                )))
            }
        }

        info!("Starting coordinator");

        if self.config.rate_feed.enabled {
            self.start_rate_feed()?;
        }

        *self.state.write() = CoordinatorState::Running;

        info!("Coordinator started successfully");
        Ok(())
    }

    /// Stop the coordinator gracefully.
    ///
    /// Writes are refused from here on. Waits for the rate feed to finish
    /// its current tick.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        if self.state().is_terminal() {
            return Ok(());
        }

        info!("Stopping coordinator");
        *self.state.write() = CoordinatorState::ShuttingDown;

        // Receivers may already be gone.
        let _ = self.shutdown_tx.send(true);

        let handle = self.feed_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Rate feed task ended abnormally");
            }
        }

        *self.state.write() = CoordinatorState::Stopped;

        info!("Coordinator stopped");
        Ok(())
    }

    /// Get the current coordinator state.
    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    /// Check if the coordinator is accepting writes.
    pub fn is_accepting_writes(&self) -> bool {
        self.state().accepts_writes()
    }

    /// Read an account's balance.
    pub async fn get_balance(&self, account_number: &AccountNumber) -> Result<Balance> {
        self.ledger.get_balance(account_number).await
    }

    /// Find the rate for `pair` valid at `at`.
    pub async fn lookup_rate(&self, pair: &CurrencyPair, at: Timestamp) -> Result<ExchangeRate> {
        let result = self.catalog.lookup(pair, at).await;
        self.metrics
            .rate_lookup(!matches!(result, Err(BankError::RateNotFound { .. })));
        result
    }

    /// Publish a rate valid over `[valid_from, valid_to]`.
    pub async fn publish_rate(
        &self,
        pair: CurrencyPair,
        rate: Decimal,
        valid_from: Timestamp,
        valid_to: Timestamp,
    ) -> Result<RateId> {
        self.ensure_accepting_writes()?;
        let id = self.catalog.publish(pair, rate, valid_from, valid_to).await?;
        self.metrics.rate_published();
        Ok(id)
    }

    /// Post a deposit or withdrawal.
    pub async fn post_transaction(&self, request: TransactionRequest) -> Result<TransactionId> {
        self.ensure_accepting_writes()?;
        let result = self
            .ledger
            .post_transaction(
                &request.account_number,
                request.transaction_type,
                request.amount,
                request.notes,
            )
            .await;
        self.metrics.transaction_posted(result.is_ok());
        result
    }

    /// Transfer funds between two accounts.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome> {
        let result = match self.ensure_accepting_writes() {
            Ok(()) => {
                self.transfers
                    .transfer(&request.from, &request.to, request.currency, request.amount)
                    .await
            }
            Err(e) => Err(e),
        };
        self.metrics.transfer_completed(&result);
        result
    }

    /// Read a transfer record.
    pub async fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>> {
        self.transfers.get_transfer(id).await
    }

    /// List an account's transactions in timestamp order.
    pub async fn transactions(&self, account_number: &AccountNumber) -> Result<Vec<Transaction>> {
        self.ledger.transactions(account_number).await
    }

    /// Open a summarization session.
    pub fn open_summary(&self, account_number: Option<AccountNumber>) -> SummarySession<'_> {
        SummarySession::new(self, account_number)
    }

    /// Post every request from `requests` in order and return the totals.
    ///
    /// Stops at the first error; transactions posted before it stay posted.
    pub async fn summarize<S>(&self, requests: S) -> Result<TransactionSummary>
    where
        S: Stream<Item = TransactionRequest>,
    {
        futures::pin_mut!(requests);
        let mut session = self.open_summary(None);
        while let Some(request) = requests.next().await {
            session.feed(request).await?;
        }
        Ok(session.finish())
    }

    /// Run each transfer from `requests` in order, yielding its result.
    ///
    /// The stream ends after the first `Err`. Failed outcomes do not end it.
    pub fn transfer_stream<'a, S>(
        &'a self,
        requests: S,
    ) -> impl Stream<Item = Result<TransferOutcome>> + 'a
    where
        S: Stream<Item = TransferRequest> + 'a,
    {
        stream::unfold((Box::pin(requests), false), move |(mut requests, done)| async move {
            if done {
                return None;
            }
            let request = requests.next().await?;
            let result = self.transfer(request).await;
            let done = result.is_err();
            Some((result, (requests, done)))
        })
    }

    /// Quote the current rate for `pair` once per stream interval.
    ///
    /// The first quote is immediate. A failed lookup is yielded once and
    /// ends the stream.
    pub fn rate_stream(&self, pair: CurrencyPair) -> impl Stream<Item = Result<RateQuote>> + '_ {
        let period = self.config.rate_stream_interval;
        stream::unfold(
            (None::<Interval>, false),
            move |(ticker, done)| {
                let pair = pair.clone();
                async move {
                    if done {
                        return None;
                    }
                    let mut ticker = ticker.unwrap_or_else(|| {
                        let mut ticker = tokio::time::interval(period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        ticker
                    });
                    ticker.tick().await;

                    let at = truncate_to_second(now());
                    match self.lookup_rate(&pair, at).await {
                        Ok(rate) => Some((Ok(RateQuote::new(rate, at)), (Some(ticker), false))),
                        Err(e) => Some((Err(e), (None, true))),
                    }
                }
            },
        )
    }

    /// Account ledger.
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Rate catalog.
    pub fn catalog(&self) -> &Arc<RateCatalog> {
        &self.catalog
    }

    /// Metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Rate lookup cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.catalog.cache_stats()
    }

    // --- Private methods ---

    fn ensure_accepting_writes(&self) -> Result<()> {
        let state = self.state();
        if state.accepts_writes() {
            Ok(())
        } else {
            Err(BankError::ServiceUnavailable(format!("coordinator is {state}")))
        }
    }

    fn start_rate_feed(&self) -> Result<()> {
        let settings = &self.config.rate_feed;
        let interval = chrono::Duration::from_std(settings.interval)
            .map_err(|e| BankError::Configuration(format!("rate feed interval: {e}")))?;

        let feed = Arc::new(RateFeed::new(
            self.catalog.clone(),
            self.rate_source.clone(),
            RateFeedConfig {
                pair: settings.pair(),
                interval,
                lead: constants::rate_feed_lead(),
            },
        ));

        let handle = feed.spawn(self.shutdown_tx.subscribe());
        *self.feed_handle.lock() = Some(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use futures::stream;
    use ledgerbank_common::Account;
    use rust_decimal_macros::dec;

    fn test_config() -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        config.rate_feed.enabled = false;
        config
    }

    async fn setup() -> (Coordinator, Arc<InMemoryLedgerStore>) {
        let (coordinator, store) = Coordinator::in_memory(test_config());
        store
            .open_account(Account::new("1001", "Alice", Currency::usd()))
            .unwrap();
        store
            .open_account(Account::new("1002", "Bob", Currency::usd()))
            .unwrap();
        coordinator
            .ledger()
            .post_transaction(&"1001".into(), TransactionType::In, dec!(100), None)
            .await
            .unwrap();
        (coordinator, store)
    }

    #[tokio::test]
    async fn test_coordinator_creation() {
        let (coordinator, _) = setup().await;

        assert_eq!(coordinator.state(), CoordinatorState::Starting);
        assert!(coordinator.is_accepting_writes());
    }

    #[tokio::test]
    async fn test_coordinator_start_stop() {
        let (coordinator, _) = setup().await;

        coordinator.start().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Running);

        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert!(coordinator.start().await.is_err());
    }

    #[tokio::test]
    async fn test_writes_refused_after_stop() {
        let (coordinator, store) = setup().await;
        coordinator.start().await.unwrap();
        coordinator.stop().await.unwrap();

        let posted = coordinator
            .post_transaction(TransactionRequest::deposit("1001", dec!(5)))
            .await;
        assert!(matches!(posted, Err(BankError::ServiceUnavailable(_))));

        let transferred = coordinator
            .transfer(TransferRequest::new("1001", "1002", "USD", dec!(5)))
            .await;
        assert!(matches!(transferred, Err(BankError::ServiceUnavailable(_))));
        assert!(store.transfers().is_empty());

        // Reads are still served.
        let balance = coordinator.get_balance(&"1001".into()).await.unwrap();
        assert_eq!(balance.amount, dec!(100));
    }

    #[tokio::test]
    async fn test_post_transaction_records_metrics() {
        let (coordinator, _) = setup().await;

        coordinator
            .post_transaction(TransactionRequest::deposit("1001", dec!(25)).with_notes("payroll"))
            .await
            .unwrap();
        let missing = coordinator
            .post_transaction(TransactionRequest::withdrawal("9999", dec!(1)))
            .await;

        assert!(matches!(missing, Err(BankError::AccountNotFound(_))));
        let balance = coordinator.get_balance(&"1001".into()).await.unwrap();
        assert_eq!(balance.amount, dec!(125));

        let snapshot = coordinator.metrics_snapshot();
        assert_eq!(snapshot.transactions_posted, 1);
        assert_eq!(snapshot.transactions_failed, 1);
    }

    #[tokio::test]
    async fn test_transfer_and_audit_read() {
        let (coordinator, _) = setup().await;

        let outcome = coordinator
            .transfer(TransferRequest::new("1001", "1002", "USD", dec!(30)))
            .await
            .unwrap();
        assert!(outcome.is_success());

        let record = coordinator
            .get_transfer(outcome.transfer_id())
            .await
            .unwrap()
            .unwrap();
        assert!(record.success);

        let legs = coordinator.transactions(&"1002".into()).await.unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].transfer_id, Some(outcome.transfer_id()));
        assert_eq!(coordinator.metrics_snapshot().transfers_settled, 1);
    }

    #[tokio::test]
    async fn test_publish_and_lookup_rate() {
        let (coordinator, _) = setup().await;
        let pair = CurrencyPair::new("USD", "INR");
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        coordinator
            .publish_rate(pair.clone(), dec!(83.25), start, start + Duration::seconds(5))
            .await
            .unwrap();

        let rate = coordinator.lookup_rate(&pair, start).await.unwrap();
        assert_eq!(rate.rate, dec!(83.25));

        let missing = coordinator
            .lookup_rate(&pair, start + Duration::seconds(6))
            .await;
        assert!(matches!(missing, Err(BankError::RateNotFound { .. })));

        let snapshot = coordinator.metrics_snapshot();
        assert_eq!(snapshot.rates_published, 1);
        assert_eq!(snapshot.rate_lookups, 2);
        assert_eq!(snapshot.rate_lookups_not_found, 1);
    }

    #[tokio::test]
    async fn test_summarize_stream() {
        let (coordinator, _) = setup().await;
        let requests = stream::iter(vec![
            TransactionRequest::deposit("1001", dec!(50)),
            TransactionRequest::withdrawal("1002", dec!(20)),
            TransactionRequest::deposit("1002", dec!(5)),
        ]);

        let summary = coordinator.summarize(requests).await.unwrap();

        assert_eq!(summary.sum_in, dec!(55));
        assert_eq!(summary.sum_out, dec!(20));
        assert_eq!(summary.sum_total, dec!(35));
        assert_eq!(summary.count, 3);
        assert_eq!(summary.account_number, Some("1002".into()));
        assert_eq!(coordinator.metrics_snapshot().summaries_completed, 1);
    }

    #[tokio::test]
    async fn test_summary_feed_error_keeps_totals() {
        let (coordinator, _) = setup().await;
        let mut session = coordinator.open_summary(Some("1001".into()));

        session
            .feed(TransactionRequest::deposit("1001", dec!(10)))
            .await
            .unwrap();
        let unknown = TransactionRequest {
            transaction_type: TransactionType::Unknown,
            ..TransactionRequest::deposit("1001", dec!(99))
        };
        let result = session.feed(unknown).await;

        assert!(matches!(result, Err(BankError::UnknownTransactionType)));
        assert_eq!(session.summary().sum_in, dec!(10));
        assert_eq!(session.summary().count, 1);
    }

    #[tokio::test]
    async fn test_transfer_stream_ends_after_error() {
        let (coordinator, store) = setup().await;
        let requests = stream::iter(vec![
            TransferRequest::new("1001", "1002", "USD", dec!(10)),
            TransferRequest::new("9999", "1002", "USD", dec!(10)),
            TransferRequest::new("1001", "1002", "USD", dec!(10)),
        ]);

        let results: Vec<_> = coordinator.transfer_stream(requests).collect().await;

        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap().is_success());
        assert!(matches!(results[1], Err(BankError::SourceAccountNotFound(_))));
        // The request after the error never ran.
        assert_eq!(store.transfers().len(), 1);
    }
}
