//! Whole-trader cycles against the mock exchange.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

use autotrader::config::{Settings, TradingConfig};
use autotrader::dashboard::{build_router, DashboardState};
use autotrader::engine::{CycleOutcome, NextCycle, OrderRejection, Placement, Trader};
use autotrader::exchange::paper::PaperGateway;
use autotrader::exchange::ExchangeGateway;
use autotrader::oracle::PredictionOracle;
use autotrader::output::DashboardSink;
use autotrader::types::{AssetBalance, Balances, Candle, OrderBook, PredictionSignal, Side};

use crate::mock_exchange::MockExchange;

/// Replays a fixed list of signals, then holds.
struct SequenceOracle {
    signals: Mutex<VecDeque<PredictionSignal>>,
}

impl SequenceOracle {
    fn new(signals: &[PredictionSignal]) -> Arc<Self> {
        Arc::new(Self {
            signals: Mutex::new(signals.iter().copied().collect()),
        })
    }
}

#[async_trait]
impl PredictionOracle for SequenceOracle {
    async fn predict(&self, window: &[Candle]) -> anyhow::Result<PredictionSignal> {
        assert!(!window.is_empty(), "oracle called without candles");
        Ok(self
            .signals
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PredictionSignal::Hold))
    }

    fn name(&self) -> String {
        "sequence".to_string()
    }
}

fn config(extra: &[(&'static str, &'static str)]) -> Arc<TradingConfig> {
    let mut pairs: Vec<(&str, &str)> = vec![
        ("DEFAULT_EXCHANGE_NAME", "binance"),
        ("TRADING_PAIR", "BTC/USDT"),
        ("DEFAULT_EXCHANGE_FEE", "0.001"),
        ("PREMIUM_OVER_EXCHANGE_FEES", "0.009"),
        ("ALGORITHM_TRUST_PERCENTAGE", "0.1"),
        ("MIN_TRANSACTION_VALUE_IN_BASE", "0.001"),
        ("TIMEFRAME", "1m"),
        ("DATA_VECTOR_LENGTH", "5"),
        ("CANCEL_ORDER_LIMIT", "3"),
        ("RETRIES_BEFORE_SLEEP_LIMIT", "2"),
        ("BASE_SLEEP_TIME", "1"),
    ];
    // Later entries win.
    pairs.extend_from_slice(extra);
    Arc::new(TradingConfig::from_settings(&Settings::from_pairs(pairs)).unwrap())
}

fn trader(
    config: Arc<TradingConfig>,
    gateway: Arc<dyn ExchangeGateway>,
    oracle: Arc<dyn PredictionOracle>,
) -> (Trader, Arc<DashboardState>) {
    let state = Arc::new(DashboardState::new());
    let sink = Arc::new(DashboardSink::new(state.clone()));
    (Trader::new(config, gateway, oracle, sink), state)
}

#[tokio::test]
async fn test_resting_order_is_cancelled_after_limit() {
    let exchange = Arc::new(MockExchange::requiring_symbol(1000.0, 2.0));
    let (mut trader, _) = trader(
        config(&[]),
        exchange.clone(),
        SequenceOracle::new(&[PredictionSignal::Up]),
    );

    let placed = trader.run_cycle().await;
    assert!(matches!(placed, CycleOutcome::Attempted(Placement::Placed(_))));
    assert_eq!(exchange.get_orders().len(), 1);
    let order = &exchange.get_orders()[0];
    assert_eq!(order.side, Side::Buy);
    assert!((order.price - 99.0).abs() < 1e-9);

    // Two cycles observe the resting order, the third cancels it.
    for expected_streak in [1, 2] {
        let outcome = trader.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::OrdersPending);
        assert_eq!(outcome.next(), NextCycle::AfterSleep);
        assert_eq!(trader.counters().open_order_streak, expected_streak);
    }
    assert!(exchange.get_cancelled().is_empty());

    let cancelled = trader.run_cycle().await;
    assert_eq!(cancelled, CycleOutcome::OrdersCancelled);
    assert_eq!(cancelled.next(), NextCycle::Immediately);
    assert_eq!(exchange.get_cancelled(), vec!["MOCK-1".to_string()]);
    assert_eq!(trader.counters().open_order_streak, 0);

    // Book is clear again; the oracle now holds.
    assert_eq!(trader.run_cycle().await, CycleOutcome::Held);
    assert_eq!(exchange.get_orders().len(), 1);
}

#[tokio::test]
async fn test_filled_buy_then_sell() {
    let exchange = Arc::new(MockExchange::new(1000.0, 2.0));
    let (mut trader, state) = trader(
        config(&[]),
        exchange.clone(),
        SequenceOracle::new(&[PredictionSignal::Up, PredictionSignal::Down]),
    );

    trader.run_cycle().await;
    exchange.fill_all();
    assert!((exchange.balance("USDT") - 900.0).abs() < 1e-6);
    assert!((exchange.balance("BTC") - (2.0 + 100.0 / 99.0)).abs() < 1e-9);

    let outcome = trader.run_cycle().await;
    assert!(matches!(outcome, CycleOutcome::Attempted(Placement::Placed(_))));

    let orders = exchange.get_orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[1].side, Side::Sell);
    assert!((orders[1].price - 101.0).abs() < 1e-9);
    assert!((orders[1].amount - 0.1 * (2.0 + 100.0 / 99.0)).abs() < 1e-9);
    assert_eq!(state.costs().len(), 2);
    assert_eq!(state.costs()[0], 100.0);
}

#[tokio::test]
async fn test_outage_backs_off_then_recovers() {
    let exchange = Arc::new(MockExchange::new(1000.0, 2.0));
    exchange.set_error("connection refused");
    let (mut trader, state) = trader(
        config(&[]),
        exchange.clone(),
        SequenceOracle::new(&[]),
    );

    let outcomes = [
        trader.run_cycle().await,
        trader.run_cycle().await,
        trader.run_cycle().await,
    ];
    assert_eq!(
        outcomes,
        [
            CycleOutcome::Failed { category: "NetworkError", sleep: false },
            CycleOutcome::Failed { category: "NetworkError", sleep: true },
            CycleOutcome::Failed { category: "NetworkError", sleep: false },
        ]
    );
    assert_eq!(trader.counters().failure_streak, 1);

    exchange.clear_error();
    assert_eq!(trader.run_cycle().await, CycleOutcome::Held);
    assert_eq!(trader.counters().failure_streak, 0);
    assert!(exchange.get_orders().is_empty());
    assert!(state
        .recent_messages(usize::MAX)
        .iter()
        .any(|m| m.contains("NetworkError exception")));
}

#[tokio::test]
async fn test_empty_book_side_is_market_data_error() {
    let exchange = Arc::new(MockExchange::new(1000.0, 2.0));
    exchange.set_book(OrderBook::default());
    let (mut trader, _) = trader(
        config(&[]),
        exchange.clone(),
        SequenceOracle::new(&[PredictionSignal::Up]),
    );

    assert_eq!(
        trader.run_cycle().await,
        CycleOutcome::Failed { category: "MarketDataError", sleep: false }
    );
    assert!(exchange.get_orders().is_empty());
}

#[tokio::test]
async fn test_dust_order_never_reaches_exchange() {
    let exchange = Arc::new(MockExchange::new(1000.0, 2.0));
    let (mut trader, state) = trader(
        config(&[("MIN_TRANSACTION_VALUE_IN_BASE", "5")]),
        exchange.clone(),
        SequenceOracle::new(&[PredictionSignal::Up]),
    );

    let outcome = trader.run_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::Attempted(Placement::Rejected(OrderRejection::BelowMinimum))
    );
    assert_eq!(outcome.next(), NextCycle::AfterSleep);
    assert!(exchange.get_orders().is_empty());
    assert!(state.costs().is_empty());
    assert_eq!(trader.counters().failure_streak, 0);
}

#[tokio::test]
async fn test_paper_gateway_keeps_orders_off_venue() {
    let exchange = Arc::new(MockExchange::new(0.0, 0.0));
    let mut seed = Balances::default();
    seed.insert("USDT", AssetBalance { free: 1000.0, used: 0.0 });
    let paper: Arc<dyn ExchangeGateway> = Arc::new(PaperGateway::new(exchange.clone(), seed));

    let (mut trader, _) = trader(
        config(&[]),
        paper.clone(),
        SequenceOracle::new(&[PredictionSignal::Up]),
    );

    match trader.run_cycle().await {
        CycleOutcome::Attempted(Placement::Placed(order)) => {
            assert!(order.id.starts_with("paper-"));
        }
        other => panic!("expected a paper order, got {other:?}"),
    }
    assert!(exchange.get_orders().is_empty());

    let balances = paper.fetch_balance().await.unwrap();
    assert!((balances.free("USDT") - 900.0).abs() < 1e-6);
    assert_eq!(trader.run_cycle().await, CycleOutcome::OrdersPending);
}

#[tokio::test]
async fn test_run_feeds_dashboard_until_shutdown() {
    let exchange = Arc::new(MockExchange::new(1000.0, 2.0));
    let (mut trader, state) = trader(
        config(&[]),
        exchange.clone(),
        SequenceOracle::new(&[PredictionSignal::Up]),
    );
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(async move { trader.run(rx).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("trader stopped in time")
        .unwrap();

    assert_eq!(exchange.get_orders().len(), 1);

    let app = build_router(state.clone());
    let response = app
        .oneshot(Request::get("/api/costs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["costs"], serde_json::json!([100.0]));

    let messages = state.recent_messages(usize::MAX);
    assert!(messages.last().unwrap().starts_with("[END]"));
    assert!(state.memory().is_some());
}
