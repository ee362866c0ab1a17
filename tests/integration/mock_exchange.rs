//! Mock exchange for integration testing.
//!
//! Provides a deterministic `ExchangeGateway` implementation that serves a
//! fixed book and candle window, rests limit orders until they are filled
//! or cancelled, and moves balances on fills. All in-memory, no network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use autotrader::exchange::ExchangeGateway;
use autotrader::types::*;

/// A mock single-venue exchange.
///
/// Balances, book, candles and resting orders are fully controllable from
/// test code.
pub struct MockExchange {
    requires_symbol: bool,
    balances: Arc<Mutex<HashMap<String, f64>>>,
    book: Arc<Mutex<OrderBook>>,
    candles: Arc<Mutex<Vec<Candle>>>,
    resting: Arc<Mutex<Vec<PlacedOrder>>>,
    orders: Arc<Mutex<Vec<PlacedOrder>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
    /// If set, every call returns this as a network error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockExchange {
    /// A BTC/USDT venue with a 99 / 101 book and a rising candle window.
    pub fn new(quote_balance: f64, base_balance: f64) -> Self {
        let mut balances = HashMap::new();
        balances.insert("USDT".to_string(), quote_balance);
        balances.insert("BTC".to_string(), base_balance);
        Self {
            requires_symbol: false,
            balances: Arc::new(Mutex::new(balances)),
            book: Arc::new(Mutex::new(OrderBook {
                bids: vec![
                    BookLevel { price: 99.0, amount: 3.0 },
                    BookLevel { price: 98.5, amount: 7.0 },
                ],
                asks: vec![
                    BookLevel { price: 101.0, amount: 2.0 },
                    BookLevel { price: 101.5, amount: 9.0 },
                ],
            })),
            candles: Arc::new(Mutex::new(autotrader::oracle::fixtures::uptrend())),
            resting: Arc::new(Mutex::new(Vec::new())),
            orders: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Same venue, but cancels must name the symbol.
    pub fn requiring_symbol(quote_balance: f64, base_balance: f64) -> Self {
        Self {
            requires_symbol: true,
            ..Self::new(quote_balance, base_balance)
        }
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn set_book(&self, book: OrderBook) {
        *self.book.lock().unwrap() = book;
    }

    /// Every order ever accepted, in submission order.
    pub fn get_orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().unwrap().clone()
    }

    pub fn get_cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn balance(&self, asset: &str) -> f64 {
        self.balances.lock().unwrap().get(asset).copied().unwrap_or(0.0)
    }

    /// Fill every resting order at its limit price.
    pub fn fill_all(&self) {
        let filled: Vec<PlacedOrder> = self.resting.lock().unwrap().drain(..).collect();
        let mut balances = self.balances.lock().unwrap();
        for order in filled {
            let value = order.price * order.amount;
            let (debit, spent, credit, received) = match order.side {
                Side::Buy => ("USDT", value, "BTC", order.amount),
                Side::Sell => ("BTC", order.amount, "USDT", value),
            };
            *balances.entry(debit.to_string()).or_default() -= spent;
            *balances.entry(credit.to_string()).or_default() += received;
        }
    }

    fn check_error(&self) -> Result<(), GatewayError> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(GatewayError::network("mock", msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExchangeGateway for MockExchange {
    async fn fetch_balance(&self) -> Result<Balances, GatewayError> {
        self.check_error()?;
        let mut balances = Balances::default();
        let reserved = |asset: &str| -> f64 {
            self.resting
                .lock()
                .unwrap()
                .iter()
                .map(|o| match (o.side, asset) {
                    (Side::Buy, "USDT") => o.price * o.amount,
                    (Side::Sell, "BTC") => o.amount,
                    _ => 0.0,
                })
                .sum()
        };
        for (asset, total) in self.balances.lock().unwrap().iter() {
            let used = reserved(asset);
            balances.insert(
                asset.clone(),
                AssetBalance {
                    free: total - used,
                    used,
                },
            );
        }
        Ok(balances)
    }

    async fn fetch_order_book(&self, _pair: &TradingPair) -> Result<OrderBook, GatewayError> {
        self.check_error()?;
        Ok(self.book.lock().unwrap().clone())
    }

    async fn fetch_ohlcv(
        &self,
        _pair: &TradingPair,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.check_error()?;
        let candles = self.candles.lock().unwrap();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }

    async fn fetch_open_orders(&self, _pair: &TradingPair) -> Result<Vec<OpenOrder>, GatewayError> {
        self.check_error()?;
        Ok(self
            .resting
            .lock()
            .unwrap()
            .iter()
            .map(|o| OpenOrder {
                id: o.id.clone(),
                side: Some(o.side),
                price: o.price,
                amount: o.amount,
            })
            .collect())
    }

    async fn create_order(
        &self,
        _pair: &TradingPair,
        order: &OrderProposal,
    ) -> Result<PlacedOrder, GatewayError> {
        self.check_error()?;
        if order.amount <= 0.0 || order.price <= 0.0 {
            return Err(GatewayError::invalid_order("mock", "amount and price must be positive"));
        }

        // Balances only move on fill; a resting order holds its spend.
        {
            let balances = self.balances.lock().unwrap();
            let (asset, spend) = match order.side {
                Side::Buy => ("USDT", order.price * order.amount),
                Side::Sell => ("BTC", order.amount),
            };
            let held = balances.get(asset).copied().unwrap_or(0.0);
            if spend > held + 1e-9 {
                return Err(GatewayError::invalid_order("mock", "insufficient balance"));
            }
        }

        let mut orders = self.orders.lock().unwrap();
        let placed = PlacedOrder {
            id: format!("MOCK-{}", orders.len() + 1),
            side: order.side,
            amount: order.amount,
            price: order.price,
            status: "open".to_string(),
        };
        orders.push(placed.clone());
        self.resting.lock().unwrap().push(placed.clone());
        Ok(placed)
    }

    async fn cancel_order(&self, id: &str, pair: Option<&TradingPair>) -> Result<(), GatewayError> {
        self.check_error()?;
        if self.requires_symbol && pair.is_none() {
            return Err(GatewayError::invalid_order("mock", "symbol required to cancel"));
        }
        let mut resting = self.resting.lock().unwrap();
        let before = resting.len();
        resting.retain(|o| o.id != id);
        if resting.len() == before {
            return Err(GatewayError::exchange("mock", format!("unknown order {id}")));
        }
        self.cancelled.lock().unwrap().push(id.to_string());
        Ok(())
    }

    fn requires_symbol_on_cancel(&self) -> bool {
        self.requires_symbol
    }

    fn name(&self) -> &str {
        "mock"
    }
}
