//! LedgerBank Coordinator Binary
//!
//! Runs the ledger core with its rate feed until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ledgerbank_coordinator::{Coordinator, CoordinatorConfig, LogFormat};
use ledgerbank_ledger::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = CoordinatorConfig::from_env().context("Configuration error")?;

    init_tracing(&config);
    info!("Starting LedgerBank coordinator");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store = open_store(&config).await?;
    let coordinator = Arc::new(Coordinator::new(config.clone(), store));

    coordinator.start().await?;

    info!(
        rate_feed = config.rate_feed.enabled,
        pair = %config.rate_feed.pair(),
        "Coordinator running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received");

    if let Err(e) = coordinator.stop().await {
        error!(error = %e, "Error during shutdown");
    }

    let snapshot = coordinator.metrics_snapshot();
    info!(
        metrics = %serde_json::to_string(&snapshot)?,
        rate_cache = %serde_json::to_string(&coordinator.cache_stats())?,
        "Coordinator shutdown complete"
    );
    Ok(())
}

fn init_tracing(config: &CoordinatorConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &CoordinatorConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgLedgerStore::connect(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            info!("Using PostgreSQL ledger store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}
