//! Open-order monitor.
//!
//! Counts consecutive cycles that find orders resting on the book. On the
//! threshold-th such cycle every open order is cancelled and the count
//! starts over. Any cycle with resting orders skips placing a new one; only
//! the cancelling cycle lets the loop go again without a pause.

use std::sync::Arc;
use tracing::{info, warn};

use super::retry::Streak;
use crate::exchange::ExchangeGateway;
use crate::output::OutputSink;
use crate::types::{GatewayError, OpenOrder, TradingPair};

/// What one look at the open orders decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOrders {
    /// Nothing resting; go on and place.
    Clear,
    /// Orders still resting below the cancel threshold.
    Pending,
    /// The threshold was reached and every resting order was cancelled.
    Cancelled,
}

impl OpenOrders {
    /// True when the cycle must not place a new order.
    pub fn skips_placing(self) -> bool {
        self != OpenOrders::Clear
    }
}

pub struct OpenOrderMonitor {
    gateway: Arc<dyn ExchangeGateway>,
    sink: Arc<dyn OutputSink>,
    pair: TradingPair,
    streak: Streak,
}

impl OpenOrderMonitor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        sink: Arc<dyn OutputSink>,
        pair: TradingPair,
        cancel_order_limit: u32,
    ) -> Self {
        Self {
            gateway,
            sink,
            pair,
            streak: Streak::new(cancel_order_limit),
        }
    }

    pub fn streak(&self) -> &Streak {
        &self.streak
    }

    /// The streak is reset before cancelling, so a failed cancel still
    /// starts a fresh count.
    pub async fn observe(&mut self, open_orders: &[OpenOrder]) -> Result<OpenOrders, GatewayError> {
        if open_orders.is_empty() {
            self.reset();
            return Ok(OpenOrders::Clear);
        }

        self.sink.emit_message("\t[INFO]\tThere are open orders.");
        let reached = self.streak.bump();
        self.sink.emit_message(&format!(
            "\t[INFO]\tCurrent open orders counter: {}.",
            if reached { self.streak.threshold() } else { self.streak.count() }
        ));

        if !reached {
            return Ok(OpenOrders::Pending);
        }

        let pair = self
            .gateway
            .requires_symbol_on_cancel()
            .then_some(&self.pair);
        info!(count = open_orders.len(), symbol = %self.pair, "Cancelling open orders");

        for order in open_orders {
            if let Err(e) = self.gateway.cancel_order(&order.id, pair).await {
                warn!(order_id = %order.id, error = %e, "Cancel failed");
                return Err(e);
            }
            self.sink.emit_message(&format!(
                "[ACTION DONE]\tOrder cancelled with id: {}",
                order.id
            ));
        }
        Ok(OpenOrders::Cancelled)
    }

    /// No open orders this cycle.
    pub fn reset(&mut self) {
        self.streak.reset();
    }
}
