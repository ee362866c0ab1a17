//! The trading loop.
//!
//! One cycle: sample memory → fetch open orders → (skip while orders rest)
//! → balances + book → plan → candles → predict → place. Every recoverable
//! failure is caught at the cycle boundary and fed to the retry policy.
//! A shutdown request abandons a prediction still waiting on the oracle;
//! otherwise the loop only stops between cycles, so an order submission in
//! flight always completes.

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use super::executor::{OrderExecutor, Placement};
use super::memory::MemoryMonitor;
use super::monitor::{OpenOrderMonitor, OpenOrders};
use super::planner::{self, OrderPlan};
use super::retry::RetryPolicy;
use crate::config::TradingConfig;
use crate::exchange::ExchangeGateway;
use crate::oracle::PredictionOracle;
use crate::output::OutputSink;
use crate::types::{CycleError, PredictionSignal, Side};

// ---------------------------------------------------------------------------
// Cycle results
// ---------------------------------------------------------------------------

/// What to do after a cycle ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextCycle {
    Immediately,
    AfterSleep,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Orders were resting on the book below the cancel threshold; nothing
    /// new was placed.
    OrdersPending,
    /// Resting orders hit the cancel threshold and were cancelled.
    OrdersCancelled,
    /// Shutdown was requested while waiting on the oracle.
    Interrupted,
    /// The oracle said hold.
    Held,
    /// An order was attempted; it may have been rejected locally or by the venue.
    Attempted(Placement),
    /// A recoverable failure. `sleep` is set when the retry policy asked for one.
    Failed { category: &'static str, sleep: bool },
}

impl CycleOutcome {
    pub fn next(&self) -> NextCycle {
        match self {
            CycleOutcome::OrdersCancelled | CycleOutcome::Interrupted => NextCycle::Immediately,
            CycleOutcome::OrdersPending | CycleOutcome::Held | CycleOutcome::Attempted(_) => {
                NextCycle::AfterSleep
            }
            CycleOutcome::Failed { sleep: true, .. } => NextCycle::AfterSleep,
            CycleOutcome::Failed { sleep: false, .. } => NextCycle::Immediately,
        }
    }
}

/// Snapshot of both streaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCounters {
    pub open_order_streak: u32,
    pub failure_streak: u32,
}

// ---------------------------------------------------------------------------
// Trader
// ---------------------------------------------------------------------------

pub struct Trader {
    config: Arc<TradingConfig>,
    gateway: Arc<dyn ExchangeGateway>,
    oracle: Arc<dyn PredictionOracle>,
    sink: Arc<dyn OutputSink>,
    executor: OrderExecutor,
    monitor: OpenOrderMonitor,
    retry: RetryPolicy,
    memory: MemoryMonitor,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Trader {
    pub fn new(
        config: Arc<TradingConfig>,
        gateway: Arc<dyn ExchangeGateway>,
        oracle: Arc<dyn PredictionOracle>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let executor = OrderExecutor::new(
            gateway.clone(),
            sink.clone(),
            config.pair.clone(),
            config.min_transaction_value_in_base,
        );
        let monitor = OpenOrderMonitor::new(
            gateway.clone(),
            sink.clone(),
            config.pair.clone(),
            config.cancel_order_limit,
        );
        Self {
            retry: RetryPolicy::new(config.retries_before_sleep_limit),
            memory: MemoryMonitor::new(config.max_ram_mb),
            config,
            gateway,
            oracle,
            sink,
            executor,
            monitor,
            shutdown: None,
        }
    }

    pub fn counters(&self) -> CycleCounters {
        CycleCounters {
            open_order_streak: self.monitor.streak().count(),
            failure_streak: self.retry.streak().count(),
        }
    }

    /// Startup summary.
    pub fn announce(&self) {
        let c = &self.config;
        info!(
            exchange = %c.exchange,
            symbol = %c.pair,
            oracle = %self.oracle.name(),
            dry_run = c.dry_run,
            "Trader starting"
        );
        self.sink.emit_message(&format!(
            "\t[INFO]\tExchange: `{}`.\n\
             \t[INFO]\tAlgorithm trust percentage (reinvestment rate): {}%.\n\
             \t[INFO]\tAlgorithm premium: {}%.\n\
             \t[INFO]\tLower limit: {} {}.\n\n\
             \t[INFO]\tStarted algorithm with pair `{}`.",
            c.exchange,
            c.trust_fraction * 100.0,
            (c.premium * 100.0 * 10_000.0).round() / 10_000.0,
            c.min_transaction_value_in_base,
            c.pair.base,
            c.pair,
        ));
    }

    /// Run cycles until `shutdown` flips to `true` (or its sender is gone).
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) {
        self.announce();
        let pause = Duration::from_secs(self.config.base_sleep_secs);
        let mut shutdown = self.shutdown.insert(shutdown).clone();

        while !stopping(&shutdown) {
            let outcome = self.run_cycle().await;
            if outcome.next() == NextCycle::AfterSleep && !stopping(&shutdown) {
                self.sink.emit_message(&format!(
                    "\t[INFO]\tPause for {} seconds.",
                    self.config.base_sleep_secs
                ));
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        self.shutdown = None;
        info!("Shutdown requested, trader stopped");
        self.sink.emit_message("[END]\tEND main loop on interrupt.");
    }

    /// One full cycle, failures included.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let sample = self.memory.sample();
        self.sink.record_memory_status(&sample.message());

        self.sink.emit_message(&format!(
            "\n\t[INFO]\tCurrent time: {}",
            Local::now().format("%B %d, %Y %I:%M:%S %p")
        ));

        match self.cycle().await {
            Ok(CycleOutcome::Interrupted) => CycleOutcome::Interrupted,
            Ok(outcome) => {
                self.retry.on_success();
                outcome
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: CycleError) -> CycleOutcome {
        let category = error.category();
        warn!(category, error = %error, "Cycle failed");

        let sleep = self.retry.on_failure();
        if sleep {
            self.sink.emit_message(&format!(
                "\t[ERROR]\tRetrying after sleep ({} seconds). {category} exception:\n\t\t{error}.",
                self.config.base_sleep_secs
            ));
        } else {
            self.sink.emit_message(&format!(
                "\t[WARNING]\t...Retrying because of {category}:\n\t\t{error}."
            ));
        }
        CycleOutcome::Failed { category, sleep }
    }

    async fn cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let pair = &self.config.pair;

        self.sink
            .emit_message("\t[INFO]\tChecking for open orders for trading pair");
        let open_orders = self.gateway.fetch_open_orders(pair).await?;
        match self.monitor.observe(&open_orders).await? {
            OpenOrders::Clear => {}
            OpenOrders::Pending => return Ok(CycleOutcome::OrdersPending),
            OpenOrders::Cancelled => return Ok(CycleOutcome::OrdersCancelled),
        }
        self.sink.emit_message("\t[INFO]\tNo open orders.");

        let plan = self.plan().await?;

        let window = self
            .gateway
            .fetch_ohlcv(pair, &self.config.timeframe, self.config.window)
            .await?;
        self.sink.emit_message(&format!(
            "\t[INFO]\tGot data: ({} x {}).",
            window.len(),
            self.config.timeframe
        ));

        let predict = self.oracle.predict(&window);
        let signal = match self.shutdown.as_mut() {
            Some(shutdown) => tokio::select! {
                signal = predict => signal,
                _ = shutdown.changed() => {
                    info!("Shutdown requested, prediction abandoned");
                    return Ok(CycleOutcome::Interrupted);
                }
            },
            None => predict.await,
        }
        .map_err(CycleError::Unclassified)?;

        let side = match signal {
            PredictionSignal::Unavailable => {
                self.sink.emit_message("\t[AI]\tCould not get prediction.");
                return Err(CycleError::PredictionUnavailable);
            }
            PredictionSignal::Hold => {
                self.sink
                    .emit_message(&format!("\t[AI]\tIs hold on {}.", pair.base));
                self.sink.emit_message("\t[INFO]\tDoing nothing.");
                return Ok(CycleOutcome::Held);
            }
            PredictionSignal::Up => {
                self.sink
                    .emit_message(&format!("\t[AI]\tIs bullish on {}.", pair.base));
                Side::Buy
            }
            PredictionSignal::Down => {
                self.sink
                    .emit_message(&format!("\t[AI]\tIs bearish on {}.", pair.base));
                Side::Sell
            }
        };

        let placement = self.executor.place(&plan.proposal(side)).await?;
        if let Some(order) = placement.placed() {
            let label = match side {
                Side::Buy => "Buy",
                Side::Sell => "Sell",
            };
            self.sink
                .emit_message(&format!("\t[ORDER]\t{label} order id: {}", order.id));
        }
        Ok(CycleOutcome::Attempted(placement))
    }

    /// Balances and book → priced, sized buy and sell.
    async fn plan(&self) -> Result<OrderPlan, CycleError> {
        let pair = &self.config.pair;
        self.sink
            .emit_message("\n\t[INFO]\tFetch the current info for the symbol.");

        let balances = self.gateway.fetch_balance().await?;
        let base_balance = balances.free(&pair.base);
        let quote_balance = balances.free(&pair.quote);
        self.sink
            .emit_message(&format!("\t[INFO]\t{} balance: {base_balance}", pair.base));
        self.sink
            .emit_message(&format!("\t[INFO]\t{} balance: {quote_balance}", pair.quote));

        let book = self.gateway.fetch_order_book(pair).await?;
        let plan = planner::plan(
            &book,
            quote_balance,
            base_balance,
            self.config.premium,
            self.config.trust_fraction,
        )?;

        self.sink.emit_message(&format!(
            "\t[INFO]\tBid ≈ {:.4} {quote}, Ask ≈ {:.4} {quote}\n",
            book.best_bid().unwrap_or_default(),
            book.best_ask().unwrap_or_default(),
            quote = pair.quote,
        ));
        Ok(plan)
    }
}

/// True once shutdown was requested or its sender is gone.
fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
