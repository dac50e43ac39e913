//! Loyalty service — append-only points ledger, tier progression,
//! redemption, and expiry for the storefront.
//!
//! Main entry point that wires the subsystems together and starts the
//! server.

use clap::Parser;
use loyalty_api::rest::AppState;
use loyalty_api::ApiServer;
use loyalty_core::config::AppConfig;
use loyalty_core::tier::TierPolicy;
use loyalty_engine::{AccrualService, BalanceAggregator, ExpirySweeper, RedemptionService};
use loyalty_ledger::{BalanceCache, LedgerStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "loyalty-server")]
#[command(about = "Loyalty points ledger and tier progression service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LOYALTY__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "LOYALTY__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Expiry sweep interval in seconds (overrides config)
    #[arg(long, env = "LOYALTY__LOYALTY__SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Skip the background expiry sweeper (API-only mode)
    #[arg(long, default_value_t = false)]
    no_sweeper: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loyalty_server=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Loyalty service starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(secs) = cli.sweep_interval_secs {
        config.loyalty.sweep_interval_secs = secs;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        tiers = config.loyalty.tiers.len(),
        sweep_interval_secs = config.loyalty.sweep_interval_secs,
        "Configuration loaded"
    );

    // Validate the tier ladder before serving anything
    let policy = TierPolicy::new(&config.loyalty.tiers)?;

    // Wire the ledger and services
    let cache = Arc::new(BalanceCache::new());
    let store = Arc::new(LedgerStore::new(cache.clone()));
    let accrual = Arc::new(AccrualService::new(store.clone(), &config.loyalty));
    let redemption = Arc::new(RedemptionService::new(store.clone()));
    let aggregator = Arc::new(BalanceAggregator::new(
        store.clone(),
        cache,
        policy,
        &config.loyalty,
    ));
    let sweeper = Arc::new(ExpirySweeper::new(store));

    // Spawn the expiry sweep task (unless API-only mode)
    if !cli.no_sweeper {
        let interval = Duration::from_secs(config.loyalty.sweep_interval_secs.max(1));
        sweeper.clone().spawn(interval);
        info!(
            interval_secs = config.loyalty.sweep_interval_secs,
            "Expiry sweeper scheduled"
        );
    } else {
        info!("Running without the background expiry sweeper");
    }

    let state = AppState {
        accrual,
        redemption,
        aggregator,
        sweeper,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config, state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Loyalty service is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
