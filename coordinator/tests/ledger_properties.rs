//! Ledger and transfer properties, checked through the coordinator against
//! the in-memory store.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ledgerbank_common::{Account, BankError, Currency, CurrencyPair, TransactionType};
use ledgerbank_coordinator::{
    Coordinator, CoordinatorConfig, TransactionRequest, TransferOutcome, TransferRequest,
};
use ledgerbank_ledger::{InMemoryLedgerStore, StoreOperation};

fn coordinator() -> (Coordinator, Arc<InMemoryLedgerStore>) {
    let mut config = CoordinatorConfig::default();
    config.rate_feed.enabled = false;
    let (coordinator, store) = Coordinator::in_memory(config);
    store
        .open_account(Account::new("1001", "Alice", Currency::usd()))
        .unwrap();
    store
        .open_account(Account::new("1002", "Bob", Currency::usd()))
        .unwrap();
    (coordinator, store)
}

async fn balance(coordinator: &Coordinator, number: &str) -> Decimal {
    coordinator.get_balance(&number.into()).await.unwrap().amount
}

async fn signed_sum(coordinator: &Coordinator, number: &str) -> Decimal {
    coordinator
        .transactions(&number.into())
        .await
        .unwrap()
        .iter()
        .map(|t| t.signed_amount())
        .sum()
}

fn posting() -> impl Strategy<Value = (bool, i64)> {
    (any::<bool>(), 1i64..1_000_000)
}

proptest! {
    #[test]
    fn balance_equals_sum_of_postings(postings in prop::collection::vec(posting(), 0..40)) {
        let (coordinator, _) = coordinator();

        tokio_test::block_on(async {
            for (deposit, cents) in &postings {
                let amount = Decimal::new(*cents, 2);
                let request = if *deposit {
                    TransactionRequest::deposit("1001", amount)
                } else {
                    TransactionRequest::withdrawal("1001", amount)
                };
                coordinator.post_transaction(request).await.unwrap();
            }

            let expected: Decimal = postings
                .iter()
                .map(|(deposit, cents)| {
                    let amount = Decimal::new(*cents, 2);
                    if *deposit { amount } else { -amount }
                })
                .sum();
            assert_eq!(balance(&coordinator, "1001").await, expected);
            assert_eq!(signed_sum(&coordinator, "1001").await, expected);
        });
    }
}

#[tokio::test]
async fn successful_transfer_posts_two_legs() {
    let (coordinator, store) = coordinator();
    coordinator
        .post_transaction(TransactionRequest::deposit("1001", dec!(500)))
        .await
        .unwrap();

    let outcome = coordinator
        .transfer(TransferRequest::new("1001", "1002", "USD", dec!(120)))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(balance(&coordinator, "1001").await, dec!(380));
    assert_eq!(balance(&coordinator, "1002").await, dec!(120));
    assert_eq!(store.transaction_count(), 3);

    let out_legs = coordinator.transactions(&"1001".into()).await.unwrap();
    let out_leg = out_legs
        .iter()
        .find(|t| t.transfer_id == Some(outcome.transfer_id()))
        .unwrap();
    assert_eq!(out_leg.transaction_type, TransactionType::Out);
    assert_eq!(out_leg.amount, dec!(120));

    let in_legs = coordinator.transactions(&"1002".into()).await.unwrap();
    assert_eq!(in_legs.len(), 1);
    assert_eq!(in_legs[0].transaction_type, TransactionType::In);
    assert_eq!(in_legs[0].amount, dec!(120));

    let record = coordinator
        .get_transfer(outcome.transfer_id())
        .await
        .unwrap()
        .unwrap();
    assert!(record.success);
}

#[tokio::test]
async fn failed_leg_pair_changes_nothing_but_the_record() {
    let (coordinator, store) = coordinator();
    coordinator
        .post_transaction(TransactionRequest::deposit("1001", dec!(500)))
        .await
        .unwrap();
    store.inject_fault(StoreOperation::InsertTransferLegs);

    let outcome = coordinator
        .transfer(TransferRequest::new("1001", "1002", "USD", dec!(120)))
        .await
        .unwrap();

    match &outcome {
        TransferOutcome::Failed { transfer, error } => {
            assert!(!transfer.success);
            assert!(matches!(error, BankError::TransferTransactionPairFailed { .. }));
            assert_eq!(error.error_code(), "TRANSACTION_PAIR_FAILED");
        }
        TransferOutcome::Settled(_) => panic!("transfer should not settle"),
    }

    assert_eq!(balance(&coordinator, "1001").await, dec!(500));
    assert_eq!(balance(&coordinator, "1002").await, dec!(0));
    assert_eq!(store.transaction_count(), 1);

    let record = coordinator
        .get_transfer(outcome.transfer_id())
        .await
        .unwrap()
        .unwrap();
    assert!(!record.success);
    assert_eq!(coordinator.metrics_snapshot().transfers_failed, 1);
}

#[tokio::test]
async fn missing_account_fails_before_any_write() {
    let (coordinator, store) = coordinator();

    let result = coordinator
        .transfer(TransferRequest::new("1001", "4040", "USD", dec!(1)))
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, BankError::DestinationAccountNotFound(_)));
    assert!(error.is_precondition());
    assert!(store.transfers().is_empty());
    assert_eq!(store.transaction_count(), 0);
    assert_eq!(coordinator.metrics_snapshot().transfers_rejected, 1);
}

#[tokio::test]
async fn overdraft_is_permitted() {
    let (coordinator, _) = coordinator();

    coordinator
        .post_transaction(TransactionRequest::withdrawal("1001", dec!(75)))
        .await
        .unwrap();
    let outcome = coordinator
        .transfer(TransferRequest::new("1001", "1002", "USD", dec!(25)))
        .await
        .unwrap();

    assert!(outcome.is_success());
    let balance = coordinator.get_balance(&"1001".into()).await.unwrap();
    assert_eq!(balance.amount, dec!(-100));
    assert!(balance.is_overdrawn());
}

#[tokio::test]
async fn lookup_follows_windows() {
    let (coordinator, _) = coordinator();
    let pair = CurrencyPair::new("USD", "INR");
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 3).unwrap();
    let end = start + Duration::seconds(5) - Duration::milliseconds(1);

    coordinator
        .publish_rate(pair.clone(), dec!(2150), start, end)
        .await
        .unwrap();

    for at in [start, start + Duration::seconds(2), end] {
        assert_eq!(coordinator.lookup_rate(&pair, at).await.unwrap().rate, dec!(2150));
    }
    for at in [start - Duration::milliseconds(1), end + Duration::milliseconds(1)] {
        assert!(matches!(
            coordinator.lookup_rate(&pair, at).await,
            Err(BankError::RateNotFound { .. })
        ));
    }
    assert!(matches!(
        coordinator.lookup_rate(&pair.inverse(), start).await,
        Err(BankError::RateNotFound { .. })
    ));
}

#[tokio::test]
async fn overlapping_windows_prefer_latest_publish() {
    let (coordinator, _) = coordinator();
    let pair = CurrencyPair::new("USD", "INR");
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

    coordinator
        .publish_rate(pair.clone(), dec!(2100), start, start + Duration::seconds(10))
        .await
        .unwrap();
    let inside = start + Duration::seconds(5);
    assert_eq!(coordinator.lookup_rate(&pair, inside).await.unwrap().rate, dec!(2100));

    // A later overlapping publish replaces the cached answer.
    coordinator
        .publish_rate(pair.clone(), dec!(2200), inside, start + Duration::seconds(20))
        .await
        .unwrap();
    assert_eq!(coordinator.lookup_rate(&pair, inside).await.unwrap().rate, dec!(2200));
    assert_eq!(
        coordinator.lookup_rate(&pair, start).await.unwrap().rate,
        dec!(2100)
    );
}

#[tokio::test]
async fn repeated_reads_are_identical() {
    let (coordinator, _) = coordinator();
    let pair = CurrencyPair::new("EUR", "USD");
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    coordinator
        .post_transaction(TransactionRequest::deposit("1002", dec!(42)))
        .await
        .unwrap();
    coordinator
        .publish_rate(pair.clone(), dec!(1.08), at, at + Duration::hours(1))
        .await
        .unwrap();

    let first_balance = coordinator.get_balance(&"1002".into()).await.unwrap();
    let second_balance = coordinator.get_balance(&"1002".into()).await.unwrap();
    assert_eq!(first_balance, second_balance);

    let first_rate = coordinator.lookup_rate(&pair, at).await.unwrap();
    let second_rate = coordinator.lookup_rate(&pair, at).await.unwrap();
    assert_eq!(first_rate, second_rate);
    assert_eq!(coordinator.cache_stats().hits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_on_one_account_lose_nothing() {
    let (coordinator, _) = coordinator();
    let coordinator = Arc::new(coordinator);
    coordinator
        .post_transaction(TransactionRequest::deposit("1001", dec!(1000)))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..50 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                coordinator
                    .transfer(TransferRequest::new("1001", "1002", "USD", dec!(3)))
                    .await
                    .map(|outcome| outcome.is_success())
            } else {
                coordinator
                    .post_transaction(TransactionRequest::withdrawal("1001", dec!(2)))
                    .await
                    .map(|_| true)
            }
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    // 25 transfers of 3 and 25 withdrawals of 2.
    assert_eq!(balance(&coordinator, "1001").await, dec!(875));
    assert_eq!(balance(&coordinator, "1002").await, dec!(75));
    assert_eq!(signed_sum(&coordinator, "1001").await, dec!(875));
    assert_eq!(signed_sum(&coordinator, "1002").await, dec!(75));
}
