//! Exchange integrations.
//!
//! Defines the `ExchangeGateway` trait and provides implementations for:
//! - KuCoin: REST v1, passphrase-signed requests
//! - Binance: REST v3, query-string signed requests
//! - Paper: dry-run wrapper that simulates balances and orders in memory

pub mod binance;
pub mod kucoin;
pub mod paper;

#[cfg(test)]
pub(crate) mod scripted;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::Hmac;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use sha2::Sha256;
use std::sync::Arc;
use tracing::info;

use crate::config::TradingConfig;
use crate::types::{
    Balances, Candle, GatewayError, OpenOrder, OrderBook, OrderProposal, PlacedOrder, TradingPair,
};

pub use binance::BinanceGateway;
pub use kucoin::KucoinGateway;
pub use paper::PaperGateway;

/// Exchange identifiers accepted in `DEFAULT_EXCHANGE_NAME`.
pub const SUPPORTED_EXCHANGES: &[&str] = &["kucoin", "binance"];

/// Quote-asset balance a dry-run session starts with.
pub const PAPER_QUOTE_BALANCE: f64 = 1000.0;

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// Abstraction over a spot exchange account.
///
/// All primitives are single round-trips: nothing here retries, and a
/// failed `create_order` leaves no partial state behind.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Free/used amounts per asset.
    async fn fetch_balance(&self) -> Result<Balances, GatewayError>;

    /// Order book snapshot, best price first on both sides.
    async fn fetch_order_book(&self, pair: &TradingPair) -> Result<OrderBook, GatewayError>;

    /// Up to `limit` most recent candles, oldest first.
    async fn fetch_ohlcv(
        &self,
        pair: &TradingPair,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Orders resting on the book for `pair`.
    async fn fetch_open_orders(&self, pair: &TradingPair) -> Result<Vec<OpenOrder>, GatewayError>;

    /// Submit one order.
    /// Fails with `InvalidOrder` for malformed or rejected orders.
    async fn create_order(
        &self,
        pair: &TradingPair,
        order: &OrderProposal,
    ) -> Result<PlacedOrder, GatewayError>;

    /// Cancel one order by id. `pair` is passed only when
    /// `requires_symbol_on_cancel()` is true.
    async fn cancel_order(&self, id: &str, pair: Option<&TradingPair>) -> Result<(), GatewayError>;

    /// Whether `cancel_order` needs the pair in addition to the id.
    fn requires_symbol_on_cancel(&self) -> bool;

    /// Venue name for logging and identification.
    fn name(&self) -> &str;
}

/// Build the gateway named in the configuration, wrapped in a
/// `PaperGateway` when `DRY_RUN` is set.
pub fn connect(config: &TradingConfig) -> Result<Arc<dyn ExchangeGateway>> {
    let venue: Arc<dyn ExchangeGateway> = match config.exchange.as_str() {
        "kucoin" => Arc::new(
            KucoinGateway::new(&config.credentials).context("Failed to build KuCoin gateway")?,
        ),
        "binance" => Arc::new(
            BinanceGateway::new(&config.credentials).context("Failed to build Binance gateway")?,
        ),
        other => anyhow::bail!("Unsupported exchange: {other}"),
    };

    if config.dry_run {
        info!(venue = venue.name(), "Dry run: orders are simulated in memory");
        let mut seed = Balances::default();
        seed.insert(
            config.pair.quote.clone(),
            crate::types::AssetBalance {
                free: PAPER_QUOTE_BALANCE,
                used: 0.0,
            },
        );
        return Ok(Arc::new(PaperGateway::new(venue, seed)));
    }

    Ok(venue)
}

// ---------------------------------------------------------------------------
// Shared wire helpers
// ---------------------------------------------------------------------------

/// Render a price or amount for the wire: truncated to 8 decimal places
/// and normalised (no trailing zeros).
pub(crate) fn wire_decimal(venue: &str, value: f64) -> Result<String, GatewayError> {
    let decimal = Decimal::try_from(value)
        .map_err(|e| GatewayError::invalid_order(venue, format!("{value}: {e}")))?;
    Ok(decimal.trunc_with_scale(8).normalize().to_string())
}

/// Parse a numeric field the venue sends as a string.
pub(crate) fn parse_number(venue: &str, field: &str, raw: &str) -> Result<f64, GatewayError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| GatewayError::decode(venue, format!("{field} is not a number: `{raw}`")))
}

/// HTTP statuses that mean the venue, not the request, is at fault.
pub(crate) fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Seconds per candle for a unified timeframe string (`1m`, `4h`, `1w`).
pub(crate) fn timeframe_secs(timeframe: &str) -> Option<i64> {
    let unit = timeframe.chars().last()?;
    let count = &timeframe[..timeframe.len() - unit.len_utf8()];
    let count: i64 = count.parse().ok().filter(|c| *c > 0)?;
    let unit_secs = match unit {
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return None,
    };
    Some(count * unit_secs)
}
