//! Dry-run gateway.
//!
//! Market data (order book, OHLCV) comes from the wrapped venue; balances,
//! open orders and placements are simulated in memory. Orders never fill:
//! they rest until cancelled, holding the funds they would spend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use super::ExchangeGateway;
use crate::types::{
    Balances, Candle, GatewayError, OpenOrder, OrderBook, OrderProposal, PlacedOrder, Side,
    TradingPair,
};

const VENUE: &str = "paper";

#[derive(Debug, Default)]
struct PaperAccount {
    balances: Balances,
    open: Vec<(TradingPair, OpenOrder)>,
    next_id: u64,
}

impl PaperAccount {
    /// Asset and amount an order holds while it rests.
    fn reservation(pair: &TradingPair, side: Side, price: f64, amount: f64) -> (String, f64) {
        match side {
            Side::Buy => (pair.quote.to_uppercase(), price * amount),
            Side::Sell => (pair.base.to_uppercase(), amount),
        }
    }
}

pub struct PaperGateway {
    venue: Arc<dyn ExchangeGateway>,
    account: Mutex<PaperAccount>,
}

impl PaperGateway {
    pub fn new(venue: Arc<dyn ExchangeGateway>, seed: Balances) -> Self {
        Self {
            venue,
            account: Mutex::new(PaperAccount {
                balances: seed,
                ..PaperAccount::default()
            }),
        }
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn fetch_balance(&self) -> Result<Balances, GatewayError> {
        Ok(self.account.lock().balances.clone())
    }

    async fn fetch_order_book(&self, pair: &TradingPair) -> Result<OrderBook, GatewayError> {
        self.venue.fetch_order_book(pair).await
    }

    async fn fetch_ohlcv(
        &self,
        pair: &TradingPair,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.venue.fetch_ohlcv(pair, timeframe, limit).await
    }

    async fn fetch_open_orders(&self, pair: &TradingPair) -> Result<Vec<OpenOrder>, GatewayError> {
        Ok(self
            .account
            .lock()
            .open
            .iter()
            .filter(|(p, _)| p == pair)
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn create_order(
        &self,
        pair: &TradingPair,
        order: &OrderProposal,
    ) -> Result<PlacedOrder, GatewayError> {
        if !(order.amount > 0.0 && order.price > 0.0) {
            return Err(GatewayError::invalid_order(
                VENUE,
                format!("amount {} at price {} is not placeable", order.amount, order.price),
            ));
        }

        let mut account = self.account.lock();
        let (asset, needed) =
            PaperAccount::reservation(pair, order.side, order.price, order.amount);
        let entry = account.balances.assets.entry(asset.clone()).or_default();
        if entry.free < needed {
            return Err(GatewayError::invalid_order(
                VENUE,
                format!("insufficient {asset}: need {needed}, have {}", entry.free),
            ));
        }
        entry.free -= needed;
        entry.used += needed;

        account.next_id += 1;
        let id = format!("paper-{}", account.next_id);
        account.open.push((
            pair.clone(),
            OpenOrder {
                id: id.clone(),
                side: Some(order.side),
                price: order.price,
                amount: order.amount,
            },
        ));

        info!(order_id = %id, side = %order.side, symbol = %pair, "Paper order resting");

        Ok(PlacedOrder {
            id,
            side: order.side,
            amount: order.amount,
            price: order.price,
            status: "open".to_string(),
        })
    }

    async fn cancel_order(&self, id: &str, _pair: Option<&TradingPair>) -> Result<(), GatewayError> {
        let mut account = self.account.lock();
        let index = account
            .open
            .iter()
            .position(|(_, o)| o.id == id)
            .ok_or_else(|| GatewayError::exchange(VENUE, format!("unknown order {id}")))?;
        let (pair, order) = account.open.remove(index);

        let side = order.side.unwrap_or(Side::Buy);
        let (asset, held) = PaperAccount::reservation(&pair, side, order.price, order.amount);
        let entry = account.balances.assets.entry(asset).or_default();
        entry.used = (entry.used - held).max(0.0);
        entry.free += held;
        Ok(())
    }

    fn requires_symbol_on_cancel(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        VENUE
    }
}
