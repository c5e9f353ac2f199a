//! Simulation controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::{info, warn};

use ledgerbank_common::{AccountNumber, BankError, Currency, TransferId};
use ledgerbank_coordinator::{
    Coordinator, CoordinatorConfig, TransactionRequest, TransferOutcome, TransferRequest,
};
use ledgerbank_ledger::InMemoryLedgerStore;

use crate::accounts::AccountFactory;
use crate::metrics::{OperationKind, SimulationMetrics};
use crate::scenario::{AssertCondition, Scenario, ScenarioStep};

/// How a labelled transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferResult {
    Settled(TransferId),
    Failed(TransferId),
    Rejected,
}

/// Controls the simulation.
pub struct SimulationController {
    /// Coordinator under test.
    coordinator: Arc<Coordinator>,
    /// Store behind the coordinator, for seeding and fault injection.
    store: Arc<InMemoryLedgerStore>,
    /// Number of accounts.
    account_count: usize,
    /// Opening deposit per account.
    initial_deposit: Decimal,
    /// Operations per second in continuous mode.
    rate: f64,
    /// Random number generator.
    rng: StdRng,
    /// Seeded accounts.
    accounts: Vec<AccountNumber>,
    /// Labelled transfers from scenario steps.
    transfers: HashMap<String, TransferResult>,
    /// Simulation metrics.
    metrics: SimulationMetrics,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(
        config: CoordinatorConfig,
        account_count: usize,
        initial_deposit: Decimal,
        rate: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let (coordinator, store) = Coordinator::in_memory(config);

        Self {
            coordinator: Arc::new(coordinator),
            store,
            account_count,
            initial_deposit,
            rate,
            rng,
            accounts: Vec::new(),
            transfers: HashMap::new(),
            metrics: SimulationMetrics::new(),
        }
    }

    /// Start the coordinator and seed the accounts.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!(accounts = self.account_count, "Initializing simulation");

        self.coordinator.start().await?;
        self.accounts = AccountFactory::seed(
            &self.store,
            &self.coordinator,
            self.account_count,
            self.initial_deposit,
        )
        .await?;

        Ok(())
    }

    /// Run a scenario. Fails on the first unmet assertion.
    pub async fn run_scenario(&mut self, scenario: Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        for (index, step) in scenario.steps.iter().enumerate() {
            self.execute_step(step)
                .await
                .map_err(|e| anyhow::anyhow!("Step {} ({:?}) failed: {}", index + 1, step, e))?;
        }

        info!(steps = scenario.steps.len(), "Scenario passed");
        Ok(())
    }

    /// Run random postings and transfers until `duration` elapses, or until
    /// Ctrl+C when no duration is given. Checks ledger consistency at the end.
    pub async fn run(&mut self, duration: Option<Duration>) -> anyhow::Result<Duration> {
        if self.accounts.len() < 2 {
            return Err(anyhow::anyhow!("continuous mode needs at least 2 accounts"));
        }
        info!(rate = self.rate, "Running simulation in continuous mode");

        let start = Instant::now();
        let delay = Duration::from_secs_f64(1.0 / self.rate.max(0.001));
        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for Ctrl+C");
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = self.random_operation() => {}
            }
            tokio::select! {
                _ = &mut deadline => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let elapsed = start.elapsed();
        self.verify_ledger().await?;
        Ok(elapsed)
    }

    /// Stop the coordinator.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.coordinator.stop().await?;
        Ok(())
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    /// Check every account's balance against its transactions.
    pub async fn verify_ledger(&self) -> anyhow::Result<()> {
        for account in self.store.accounts() {
            let transactions = self.coordinator.transactions(&account.account_number).await?;
            let posted: Decimal = transactions.iter().map(|t| t.signed_amount()).sum();
            if posted != account.balance {
                return Err(anyhow::anyhow!(
                    "Account {} balance {} does not match posted total {}",
                    account.account_number,
                    account.balance,
                    posted
                ));
            }
        }
        info!(accounts = self.store.accounts().len(), "Ledger consistent");
        Ok(())
    }

    async fn random_operation(&mut self) {
        let (kind, from, to, amount) = {
            let rng = &mut self.rng;
            let accounts = &self.accounts;
            let roll = rng.gen_range(0..10);
            let from = accounts[rng.gen_range(0..accounts.len())].clone();
            let mut to = accounts[rng.gen_range(0..accounts.len())].clone();
            while to == from {
                to = accounts[rng.gen_range(0..accounts.len())].clone();
            }
            let amount = Decimal::new(rng.gen_range(100..100_000), 2);
            let kind = match roll {
                0..=1 => OperationKind::Deposit,
                2..=3 => OperationKind::Withdrawal,
                _ => OperationKind::Transfer,
            };
            (kind, from, to, amount)
        };

        let started = Instant::now();
        let success = match kind {
            OperationKind::Deposit => self
                .post(TransactionRequest::deposit(from, amount))
                .await
                .is_ok(),
            OperationKind::Withdrawal => self
                .post(TransactionRequest::withdrawal(from, amount))
                .await
                .is_ok(),
            OperationKind::Transfer => matches!(
                self.coordinator
                    .transfer(TransferRequest::new(from, to, Currency::usd(), amount))
                    .await,
                Ok(TransferOutcome::Settled(_))
            ),
        };
        self.metrics.record(kind, success, started.elapsed());
    }

    async fn post(&self, request: TransactionRequest) -> Result<(), BankError> {
        self.coordinator.post_transaction(request).await.map(|_| ())
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Deposit { account, amount } => {
                let request = TransactionRequest::deposit(account.as_str(), parse_amount(amount)?);
                let started = Instant::now();
                let result = self.post(request).await;
                self.metrics
                    .record(OperationKind::Deposit, result.is_ok(), started.elapsed());
                result?;
            }
            ScenarioStep::Withdraw { account, amount } => {
                let request =
                    TransactionRequest::withdrawal(account.as_str(), parse_amount(amount)?);
                let started = Instant::now();
                let result = self.post(request).await;
                self.metrics
                    .record(OperationKind::Withdrawal, result.is_ok(), started.elapsed());
                result?;
            }
            ScenarioStep::Transfer {
                label,
                from,
                to,
                amount,
                currency,
            } => {
                info!("Transfer: {} -> {} {} {}", from, to, amount, currency);

                let request = TransferRequest::new(
                    from.as_str(),
                    to.as_str(),
                    currency.as_str(),
                    parse_amount(amount)?,
                );
                let started = Instant::now();
                let result = match self.coordinator.transfer(request).await {
                    Ok(TransferOutcome::Settled(transfer)) => TransferResult::Settled(transfer.id),
                    Ok(TransferOutcome::Failed { transfer, error }) => {
                        warn!(transfer_id = %transfer.id, error = %error, "Transfer failed");
                        TransferResult::Failed(transfer.id)
                    }
                    Err(e) => {
                        warn!(error = %e, "Transfer rejected");
                        TransferResult::Rejected
                    }
                };
                self.metrics.record(
                    OperationKind::Transfer,
                    matches!(result, TransferResult::Settled(_)),
                    started.elapsed(),
                );
                if let Some(label) = label {
                    self.transfers.insert(label.clone(), result);
                }
            }
            ScenarioStep::InjectFault { fault } => {
                info!("Injecting fault {:?}", fault);
                self.store.inject_fault(fault.operation());
            }
            ScenarioStep::ClearFaults => {
                info!("Clearing faults");
                self.store.clear_faults();
            }
            ScenarioStep::Wait { millis } => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
            }
            ScenarioStep::Assert { condition } => {
                self.check(condition).await?;
            }
        }

        Ok(())
    }

    async fn check(&self, condition: &AssertCondition) -> anyhow::Result<()> {
        match condition {
            AssertCondition::BalanceEquals { account, amount } => {
                let expected = parse_amount(amount)?;
                let actual = self.coordinator.get_balance(&account.as_str().into()).await?;
                if actual.amount != expected {
                    return Err(anyhow::anyhow!(
                        "balance of {} is {}, expected {}",
                        account,
                        actual.amount,
                        expected
                    ));
                }
            }
            AssertCondition::TransferSucceeded { label } => {
                let id = match self.labelled(label)? {
                    TransferResult::Settled(id) => id,
                    other => return Err(anyhow::anyhow!("transfer {} ended as {:?}", label, other)),
                };
                self.expect_record(id, true).await?;
            }
            AssertCondition::TransferFailed { label } => {
                let id = match self.labelled(label)? {
                    TransferResult::Failed(id) => id,
                    other => return Err(anyhow::anyhow!("transfer {} ended as {:?}", label, other)),
                };
                self.expect_record(id, false).await?;
            }
            AssertCondition::TransferRejected { label } => {
                let result = self.labelled(label)?;
                if result != TransferResult::Rejected {
                    return Err(anyhow::anyhow!("transfer {} ended as {:?}", label, result));
                }
            }
            AssertCondition::LedgerConsistent => self.verify_ledger().await?,
        }

        info!("Assertion held: {:?}", condition);
        Ok(())
    }

    fn labelled(&self, label: &str) -> anyhow::Result<TransferResult> {
        self.transfers
            .get(label)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no transfer labelled {}", label))
    }

    async fn expect_record(&self, id: TransferId, success: bool) -> anyhow::Result<()> {
        let record = self
            .coordinator
            .get_transfer(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("transfer {} has no record", id))?;
        if record.success != success {
            return Err(anyhow::anyhow!(
                "transfer {} recorded success = {}, expected {}",
                id,
                record.success,
                success
            ));
        }
        Ok(())
    }
}

fn parse_amount(amount: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str_exact(amount).map_err(|e| anyhow::anyhow!("bad amount {:?}: {}", amount, e))
}
