//! LedgerBank Simulator
//!
//! Drives an in-memory coordinator with scripted scenarios or random load.

use std::time::Duration;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod accounts;
mod controller;
mod metrics;
mod scenario;

use controller::SimulationController;
use ledgerbank_coordinator::CoordinatorConfig;
use scenario::Scenario;

/// LedgerBank Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "LedgerBank scripted and randomized load simulator")]
struct Args {
    /// Number of accounts to open
    #[arg(short, long, default_value = "4")]
    accounts: usize,

    /// Built-in scenario name or path to a JSON scenario file
    #[arg(short, long)]
    scenario: Option<String>,

    /// Opening deposit per account
    #[arg(long, default_value = "10000")]
    initial_deposit: Decimal,

    /// Operations per second in continuous mode
    #[arg(long, default_value = "10.0")]
    rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Run the periodic rate feed alongside the simulation
    #[arg(long)]
    rate_feed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting LedgerBank Simulator");
    info!("Accounts: {}", args.accounts);

    let mut config = CoordinatorConfig::default();
    config.rate_feed.enabled = args.rate_feed;

    // A scenario expects accounts to start empty.
    let initial_deposit = if args.scenario.is_some() {
        Decimal::ZERO
    } else {
        args.initial_deposit
    };

    let mut controller =
        SimulationController::new(config, args.accounts, initial_deposit, args.rate, args.seed);
    controller.initialize().await?;

    let elapsed = if let Some(scenario_name) = &args.scenario {
        info!("Running scenario: {}", scenario_name);

        let scenario = Scenario::load(scenario_name)?;
        let started = std::time::Instant::now();
        controller.run_scenario(scenario).await?;
        started.elapsed()
    } else {
        info!("Running in continuous mode");
        info!("Press Ctrl+C to stop");

        let duration = if args.duration > 0 {
            Some(Duration::from_secs(args.duration))
        } else {
            None
        };

        controller.run(duration).await?
    };

    controller.shutdown().await?;

    // Print metrics
    let metrics = controller.get_metrics();
    info!("Simulation complete");
    info!("Total operations: {}", metrics.total_operations);
    info!("Successful: {}", metrics.successful_operations);
    info!("Failed: {}", metrics.failed_operations);
    info!(
        "Transfers: {} ({} not settled)",
        metrics.transfers, metrics.failed_transfers
    );
    info!("Success rate: {:.2}%", metrics.success_rate() * 100.0);
    info!("Throughput: {:.1} ops/s", metrics.throughput(elapsed));
    info!(
        "Latency: avg {}µs, p50 {}µs, p95 {}µs, p99 {}µs",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p95_latency_us(),
        metrics.p99_latency_us()
    );

    Ok(())
}
