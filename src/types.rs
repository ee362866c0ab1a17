//! Shared types for the AUTOTRADER bot.
//!
//! These types form the data model used across all modules: market data
//! coming back from an exchange, order proposals flowing out of the planner,
//! and the error taxonomy the control loop classifies failures with.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Pair and side
// ---------------------------------------------------------------------------

/// A traded pair. Amounts are denominated in `base`, prices in `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parse a `BASE/QUOTE` symbol. Returns `None` when either half is empty.
    pub fn parse(symbol: &str) -> Option<Self> {
        let (base, quote) = symbol.split_once('/')?;
        let (base, quote) = (base.trim(), quote.trim());
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }

    /// Unified `BASE/QUOTE` symbol; gateways translate it to venue format.
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order kind. The bot only ever submits `Limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// A priced, sized order the bot intends to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderProposal {
    pub kind: OrderKind,
    pub side: Side,
    /// Limit price in quote units.
    pub price: f64,
    /// Quantity in base units.
    pub amount: f64,
}

impl OrderProposal {
    pub fn limit(side: Side, price: f64, amount: f64) -> Self {
        Self {
            kind: OrderKind::Limit,
            side,
            price,
            amount,
        }
    }

    /// price × amount, in quote units.
    pub fn transaction_value(&self) -> f64 {
        self.price * self.amount
    }
}

/// An order accepted by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub id: String,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
    pub status: String,
}

/// A resting order as reported by `fetch_open_orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub side: Option<Side>,
    pub price: f64,
    pub amount: f64,
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One `[price, qty]` level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub amount: f64,
}

/// Order book snapshot, best price first on both sides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Best bid, or `None` when the side is empty or quotes a non-positive price.
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price).filter(|p| *p > 0.0)
    }

    /// Best ask, or `None` when the side is empty or quotes a non-positive price.
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price).filter(|p| *p > 0.0)
    }
}

/// One OHLCV candle. `timestamp` is the candle open time in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Free/used amounts of one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub free: f64,
    pub used: f64,
}

/// Account balances keyed by asset symbol (upper-case).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    pub assets: HashMap<String, AssetBalance>,
}

impl Balances {
    pub fn insert(&mut self, asset: impl Into<String>, balance: AssetBalance) {
        self.assets.insert(asset.into().to_uppercase(), balance);
    }

    /// Free amount of `asset`; an asset the account has never held is zero.
    pub fn free(&self, asset: &str) -> f64 {
        self.assets
            .get(&asset.to_uppercase())
            .map(|b| b.free)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// Directional call produced by the oracle for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSignal {
    Up,
    Down,
    Hold,
    /// The oracle could not decide.
    Unavailable,
}

impl PredictionSignal {
    /// Parse a bare `up` / `down` / `hold` word (case-insensitive).
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "hold" => Some(Self::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for PredictionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionSignal::Up => write!(f, "up"),
            PredictionSignal::Down => write!(f, "down"),
            PredictionSignal::Hold => write!(f, "hold"),
            PredictionSignal::Unavailable => write!(f, "unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Startup-time configuration failures. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No valid exchange name provided (supported: {supported}); actual name provided: `{given}`")]
    UnsupportedExchange { given: String, supported: String },

    #[error("Missing required option: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Failed to read config file {path}: {message}")]
    File { path: String, message: String },
}

/// Failures reported by an `ExchangeGateway`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Malformed or rejected order. Absorbed by the executor.
    #[error("Invalid order ({venue}): {message}")]
    InvalidOrder { venue: String, message: String },

    /// Transport failure or venue-side outage.
    #[error("Network error ({venue}): {message}")]
    Network { venue: String, message: String },

    /// Any other rejection by the venue.
    #[error("Exchange error ({venue}): {message}")]
    Exchange { venue: String, message: String },

    /// The venue answered with something we could not interpret.
    #[error("Unexpected response ({venue}): {message}")]
    Decode { venue: String, message: String },
}

impl GatewayError {
    pub fn invalid_order(venue: &str, message: impl Into<String>) -> Self {
        Self::InvalidOrder {
            venue: venue.to_string(),
            message: message.into(),
        }
    }

    pub fn network(venue: &str, message: impl Into<String>) -> Self {
        Self::Network {
            venue: venue.to_string(),
            message: message.into(),
        }
    }

    pub fn exchange(venue: &str, message: impl Into<String>) -> Self {
        Self::Exchange {
            venue: venue.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(venue: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            venue: venue.to_string(),
            message: message.into(),
        }
    }

    /// Map a `reqwest` failure onto the taxonomy.
    pub fn transport(venue: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(venue, err.to_string())
        } else {
            Self::network(venue, err.to_string())
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::InvalidOrder { .. } => "InvalidOrder",
            GatewayError::Network { .. } => "NetworkError",
            GatewayError::Exchange { .. } => "ExchangeError",
            GatewayError::Decode { .. } => "DecodeError",
        }
    }
}

/// Reasons the planner cannot price or size an order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// One side of the order book is empty.
    #[error("{0} price is missing from the order book")]
    MissingQuote(QuoteSide),

    /// Sizing would divide by a non-positive buy price.
    #[error("Cannot size an order against non-positive price {0}")]
    NonPositivePrice(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    Bid,
    Ask,
}

impl fmt::Display for QuoteSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteSide::Bid => write!(f, "Bid"),
            QuoteSide::Ask => write!(f, "Ask"),
        }
    }
}

/// Every recoverable failure a cycle can end in. All of them feed the
/// retry policy.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    MarketData(#[from] PlanError),

    #[error("Could not get prediction")]
    PredictionUnavailable,

    #[error(transparent)]
    Connectivity(#[from] GatewayError),

    #[error("{0:#}")]
    Unclassified(anyhow::Error),
}

impl CycleError {
    /// Category tag logged alongside the failure.
    pub fn category(&self) -> &'static str {
        match self {
            CycleError::MarketData(PlanError::MissingQuote(_)) => "MarketDataError",
            CycleError::MarketData(PlanError::NonPositivePrice(_)) => "DivisionError",
            CycleError::PredictionUnavailable => "PredictionUnavailable",
            CycleError::Connectivity(e) => e.category(),
            CycleError::Unclassified(_) => "UnclassifiedError",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
