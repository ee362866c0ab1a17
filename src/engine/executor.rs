//! Order executor.
//!
//! Submits one proposal per call. Dust orders are refused locally and
//! `InvalidOrder` rejections are absorbed here; neither counts as a failed
//! cycle. Any other gateway error goes back to the trader.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::exchange::ExchangeGateway;
use crate::output::OutputSink;
use crate::types::{GatewayError, OrderProposal, PlacedOrder, TradingPair};

// ---------------------------------------------------------------------------
// Placement result
// ---------------------------------------------------------------------------

/// Why an order was not placed.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderRejection {
    /// Amount at or below the configured minimum; the gateway was not called.
    BelowMinimum,
    /// The gateway refused the order as malformed.
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Placed(PlacedOrder),
    Rejected(OrderRejection),
}

impl Placement {
    pub fn placed(&self) -> Option<&PlacedOrder> {
        match self {
            Placement::Placed(order) => Some(order),
            Placement::Rejected(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    sink: Arc<dyn OutputSink>,
    pair: TradingPair,
    min_transaction_value_in_base: f64,
}

impl OrderExecutor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        sink: Arc<dyn OutputSink>,
        pair: TradingPair,
        min_transaction_value_in_base: f64,
    ) -> Self {
        Self {
            gateway,
            sink,
            pair,
            min_transaction_value_in_base,
        }
    }

    /// Validate and submit `order`.
    ///
    /// `Err` carries only connectivity-class failures (`Network`,
    /// `Exchange`, `Decode`); rejections come back as `Ok(Rejected)`.
    pub async fn place(&self, order: &OrderProposal) -> Result<Placement, GatewayError> {
        let value = round_cents(order.transaction_value());
        self.sink.emit_message(&format!(
            "\t[INFO]\tTrying to {} {} with total transaction value ≈ {} {}.",
            order.side, self.pair.base, value, self.pair.quote
        ));

        if order.amount <= self.min_transaction_value_in_base {
            info!(
                amount = order.amount,
                minimum = self.min_transaction_value_in_base,
                "Order below minimum, not submitted"
            );
            self.sink
                .emit_message("\t[INFO]\tWon't process order (transaction too small).");
            return Ok(Placement::Rejected(OrderRejection::BelowMinimum));
        }

        match self.gateway.create_order(&self.pair, order).await {
            Ok(placed) => {
                info!(
                    order_id = %placed.id,
                    side = %order.side,
                    amount = order.amount,
                    price = order.price,
                    value,
                    "Order placed"
                );
                self.sink.emit_message(&format!(
                    "[ACTION DONE]\tPlace a {} {} order of {}{} x {}{} ≈ {}{}",
                    order.kind,
                    order.side,
                    self.pair.base.to_lowercase(),
                    order.amount,
                    self.pair.quote.to_lowercase(),
                    order.price,
                    self.pair.quote.to_lowercase(),
                    value
                ));
                self.sink.record_transaction_cost(value);
                Ok(Placement::Placed(placed))
            }
            Err(GatewayError::InvalidOrder { message, .. }) => {
                warn!(side = %order.side, error = %message, "Order rejected as invalid");
                self.sink
                    .emit_message(&format!("\t[ERROR]\tInvalid order:\n\t\t{message}."));
                Ok(Placement::Rejected(OrderRejection::Invalid(message)))
            }
            Err(e) => Err(e),
        }
    }
}

/// Round to two decimal places for display and cost reporting.
fn round_cents(value: f64) -> f64 {
    Decimal::try_from(value)
        .ok()
        .and_then(|d| d.round_dp(2).to_f64())
        .unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
