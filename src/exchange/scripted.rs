//! Scripted gateway for unit tests.
//!
//! Every response is set from test code; calls that change state are
//! recorded so tests can assert on them.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::ExchangeGateway;
use crate::types::{
    AssetBalance, Balances, Candle, GatewayError, OpenOrder, OrderBook, OrderProposal,
    PlacedOrder, TradingPair,
};

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    requires_symbol: bool,
    balances: Mutex<Balances>,
    book: Mutex<OrderBook>,
    candles: Mutex<Vec<Candle>>,
    open_orders: Mutex<Vec<OpenOrder>>,
    /// Returned by every `fetch_*` call while set.
    fetch_error: Mutex<Option<GatewayError>>,
    /// Returned by `create_order` while set.
    create_error: Mutex<Option<GatewayError>>,
    created: Mutex<Vec<OrderProposal>>,
    cancelled: Mutex<Vec<(String, Option<TradingPair>)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requiring_symbol_on_cancel() -> Self {
        Self {
            requires_symbol: true,
            ..Self::default()
        }
    }

    pub fn set_balance(&self, asset: &str, free: f64) {
        self.balances
            .lock()
            .insert(asset, AssetBalance { free, used: 0.0 });
    }

    pub fn set_order_book(&self, book: OrderBook) {
        *self.book.lock() = book;
    }

    pub fn set_candles(&self, candles: Vec<Candle>) {
        *self.candles.lock() = candles;
    }

    pub fn set_open_orders(&self, orders: Vec<OpenOrder>) {
        *self.open_orders.lock() = orders;
    }

    pub fn set_fetch_error(&self, error: Option<GatewayError>) {
        *self.fetch_error.lock() = error;
    }

    pub fn set_create_error(&self, error: Option<GatewayError>) {
        *self.create_error.lock() = error;
    }

    pub fn created(&self) -> Vec<OrderProposal> {
        self.created.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<(String, Option<TradingPair>)> {
        self.cancelled.lock().clone()
    }

    fn check_fetch(&self) -> Result<(), GatewayError> {
        match self.fetch_error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn fetch_balance(&self) -> Result<Balances, GatewayError> {
        self.check_fetch()?;
        Ok(self.balances.lock().clone())
    }

    async fn fetch_order_book(&self, _pair: &TradingPair) -> Result<OrderBook, GatewayError> {
        self.check_fetch()?;
        Ok(self.book.lock().clone())
    }

    async fn fetch_ohlcv(
        &self,
        _pair: &TradingPair,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.check_fetch()?;
        let candles = self.candles.lock();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }

    async fn fetch_open_orders(&self, _pair: &TradingPair) -> Result<Vec<OpenOrder>, GatewayError> {
        self.check_fetch()?;
        Ok(self.open_orders.lock().clone())
    }

    async fn create_order(
        &self,
        _pair: &TradingPair,
        order: &OrderProposal,
    ) -> Result<PlacedOrder, GatewayError> {
        self.created.lock().push(order.clone());
        if let Some(e) = self.create_error.lock().clone() {
            return Err(e);
        }
        Ok(PlacedOrder {
            id: format!("scripted-{}", self.created.lock().len()),
            side: order.side,
            amount: order.amount,
            price: order.price,
            status: "open".to_string(),
        })
    }

    async fn cancel_order(&self, id: &str, pair: Option<&TradingPair>) -> Result<(), GatewayError> {
        self.cancelled
            .lock()
            .push((id.to_string(), pair.cloned()));
        self.open_orders.lock().retain(|o| o.id != id);
        Ok(())
    }

    fn requires_symbol_on_cancel(&self) -> bool {
        self.requires_symbol
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
