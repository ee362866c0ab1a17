//! AUTOTRADER: unattended limit-order bot
//!
//! Entry point. Parses the command line, initialises structured logging,
//! loads and validates the options files, and runs the trading loop until
//! Ctrl+C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use autotrader::config::{PredictionConfig, TradingConfig};
use autotrader::dashboard::{self, DashboardState};
use autotrader::engine::Trader;
use autotrader::exchange;
use autotrader::oracle::{self, fixtures};
use autotrader::output::{ConsoleSink, DashboardSink, OutputSink};

const BANNER: &str = r#"
    _   _   _ _____ ___ _____ ____      _    ____  _____ ____
   / \ | | | |_   _/ _ \_   _|  _ \    / \  |  _ \| ____|  _ \
  / _ \| | | | | || | | || | | |_) |  / _ \ | | | |  _| | |_) |
 / ___ \ |_| | | || |_| || | |  _ <  / ___ \| |_| | |___|  _ <
/_/   \_\___/  |_| \___/ |_| |_| \_\/_/   \_\____/|_____|_| \_\

  Single-pair limit-order bot
  v0.1.0
"#;

#[derive(Debug, Parser)]
#[command(name = "autotrader", version, about = "Unattended single-pair limit-order bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the trading loop.
    Run {
        /// Trading options file.
        #[arg(short = 'e', long = "env", default_value = "main.env")]
        env: PathBuf,
        /// Prediction options file.
        #[arg(short = 'p', long = "predictions", default_value = "probability_llm.env")]
        predictions: PathBuf,
        /// Serve the web dashboard instead of logging to the console.
        #[arg(short = 'd', long)]
        dashboard: bool,
    },
    /// Print the oracle's signal for two canned windows.
    Test {
        #[arg(short = 'p', long = "predictions", default_value = "probability_llm.env")]
        predictions: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Run {
            env,
            predictions,
            dashboard,
        } => run(&env, &predictions, dashboard).await,
        Command::Test { predictions } => smoke_test(&predictions).await,
    }
}

async fn run(env: &Path, predictions: &Path, with_dashboard: bool) -> Result<()> {
    let config = TradingConfig::load(env)
        .with_context(|| format!("Invalid trading options ({})", env.display()))?;
    let prediction = PredictionConfig::load(predictions)
        .with_context(|| format!("Invalid prediction options ({})", predictions.display()))?;
    let config = Arc::new(config);

    println!("{BANNER}");
    info!(
        exchange = %config.exchange,
        symbol = %config.pair,
        timeframe = %config.timeframe,
        window = config.window,
        sleep_secs = config.base_sleep_secs,
        dry_run = config.dry_run,
        "AUTOTRADER starting up"
    );

    let gateway = exchange::connect(&config)?;
    let oracle = oracle::build(&prediction)?;
    info!(oracle = %oracle.name(), "Oracle ready");

    let sink: Arc<dyn OutputSink> = if with_dashboard {
        let state = Arc::new(DashboardState::new());
        dashboard::spawn_dashboard(state.clone(), config.dashboard_port).await?;
        Arc::new(DashboardSink::new(state))
    } else {
        Arc::new(ConsoleSink)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(watch_interrupts(shutdown_tx));

    info!("Entering main loop. Press Ctrl+C to stop.");
    let mut trader = Trader::new(config, gateway, oracle, sink);
    trader.run(shutdown_rx).await;

    info!("AUTOTRADER shut down cleanly.");
    Ok(())
}

/// First Ctrl+C asks the trader to stop; a second one exits at once.
async fn watch_interrupts(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        // Dropping the sender would read as a shutdown request.
        let _keep = shutdown_tx;
        return std::future::pending().await;
    }

    info!("Shutdown signal received, stopping after the current cycle (Ctrl+C again to force)");
    let _ = shutdown_tx.send(true);

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Second Ctrl+C, exiting without waiting for the cycle");
        std::process::exit(130);
    }
}

/// Run the configured oracle against the up and down fixtures.
async fn smoke_test(predictions: &Path) -> Result<()> {
    let prediction = PredictionConfig::load(predictions)
        .with_context(|| format!("Invalid prediction options ({})", predictions.display()))?;
    let oracle = oracle::build(&prediction)?;
    info!(oracle = %oracle.name(), "Testing oracle");

    for (label, window) in [("uptrend", fixtures::uptrend()), ("downtrend", fixtures::downtrend())] {
        let signal = oracle
            .predict(&window)
            .await
            .with_context(|| format!("Oracle failed on the {label} window"))?;
        println!("{label}: {signal}");
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("autotrader=info"));

    let json_logging = std::env::var("AUTOTRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
