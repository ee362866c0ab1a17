//! KuCoin spot integration.
//!
//! API docs: https://www.kucoin.com/docs/rest/spot-trading
//! Base URL: https://api.kucoin.com
//! Auth: `KC-API-*` headers, HMAC-SHA256 over
//! `timestamp + METHOD + endpoint + body`, base64-encoded. The passphrase
//! is signed with the same secret (key version 2).
//! Responses are wrapped in `{ "code": "200000", "data": ... }`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::Mac;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{
    is_transient, parse_number, timeframe_secs, wire_decimal, ExchangeGateway, HmacSha256,
};
use crate::config::Credentials;
use crate::types::{
    AssetBalance, Balances, BookLevel, Candle, GatewayError, OpenOrder, OrderBook, OrderKind,
    OrderProposal, PlacedOrder, Side, TradingPair,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://api.kucoin.com";
const VENUE: &str = "kucoin";
const SUCCESS_CODE: &str = "200000";

/// Envelope codes that mean the order itself was malformed or refused.
const INVALID_ORDER_CODES: &[&str] = &["400100", "400600", "400760"];

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct KucoinAccount {
    currency: String,
    available: String,
    holds: String,
}

#[derive(Debug, Deserialize)]
struct KucoinBook {
    #[serde(default)]
    bids: Vec<[String; 2]>,
    #[serde(default)]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct KucoinOrderPage {
    #[serde(default)]
    items: Vec<KucoinOrder>,
}

#[derive(Debug, Deserialize)]
struct KucoinOrder {
    id: String,
    side: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinOrderId {
    order_id: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KucoinGateway {
    http: Client,
    base_url: String,
    api_key: SecretString,
    secret: SecretString,
    passphrase: SecretString,
}

impl KucoinGateway {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_base_url(credentials, BASE_URL)
    }

    pub fn with_base_url(credentials: &Credentials, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("AUTOTRADER/0.1.0")
            .build()
            .context("Failed to build HTTP client for KuCoin")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::new(credentials.api_key.expose_secret().clone()),
            secret: SecretString::new(credentials.secret.expose_secret().clone()),
            passphrase: SecretString::new(credentials.passphrase.expose_secret().clone()),
        })
    }

    /// `BTC/USDT` → `BTC-USDT`.
    fn market_symbol(pair: &TradingPair) -> String {
        format!("{}-{}", pair.base, pair.quote)
    }

    /// Unified timeframe → KuCoin candle type.
    fn candle_type(timeframe: &str) -> Option<&'static str> {
        Some(match timeframe {
            "1m" => "1min",
            "3m" => "3min",
            "5m" => "5min",
            "15m" => "15min",
            "30m" => "30min",
            "1h" => "1hour",
            "2h" => "2hour",
            "4h" => "4hour",
            "6h" => "6hour",
            "8h" => "8hour",
            "12h" => "12hour",
            "1d" => "1day",
            "1w" => "1week",
            _ => return None,
        })
    }

    fn signature(secret: &str, payload: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| GatewayError::exchange(VENUE, format!("Invalid API secret: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    // -- Internal helpers ------------------------------------------------

    /// Send a signed request; `endpoint` includes the query string.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, GatewayError> {
        let body_text = body.map(|b| b.to_string()).unwrap_or_default();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let secret = self.secret.expose_secret();
        let prehash = format!("{timestamp}{}{endpoint}{body_text}", method.as_str());

        debug!(method = %method, endpoint, "KuCoin request");

        let mut req = self
            .http
            .request(method, format!("{}{endpoint}", self.base_url))
            .header("KC-API-KEY", self.api_key.expose_secret().as_str())
            .header("KC-API-SIGN", Self::signature(secret, &prehash)?)
            .header("KC-API-TIMESTAMP", timestamp.as_str())
            .header(
                "KC-API-PASSPHRASE",
                Self::signature(secret, self.passphrase.expose_secret())?,
            )
            .header("KC-API-KEY-VERSION", "2");
        if !body_text.is_empty() {
            req = req
                .header("Content-Type", "application/json")
                .body(body_text);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::transport(VENUE, e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::transport(VENUE, e))?;

        if is_transient(status) {
            return Err(GatewayError::network(VENUE, format!("HTTP {status}: {text}")));
        }
        unwrap_envelope(&text)
    }
}

/// Check the envelope code and decode `data`.
fn unwrap_envelope<T: DeserializeOwned>(text: &str) -> Result<T, GatewayError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| GatewayError::decode(VENUE, format!("{e}: {text}")))?;

    if envelope.code != SUCCESS_CODE {
        let message = format!(
            "{} (code {})",
            envelope.msg.unwrap_or_default(),
            envelope.code
        );
        return Err(if INVALID_ORDER_CODES.contains(&envelope.code.as_str()) {
            GatewayError::invalid_order(VENUE, message)
        } else {
            GatewayError::exchange(VENUE, message)
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| GatewayError::decode(VENUE, "response carries no data"))?;
    serde_json::from_value(data).map_err(|e| GatewayError::decode(VENUE, e.to_string()))
}

/// Rows arrive newest first as
/// `[time_s, open, close, high, low, volume, turnover]`.
fn parse_candles(rows: Vec<Vec<String>>, limit: usize) -> Result<Vec<Candle>, GatewayError> {
    let mut candles = rows
        .iter()
        .map(|row| -> Result<Candle, GatewayError> {
            if row.len() < 6 {
                return Err(GatewayError::decode(VENUE, format!("short candle row: {row:?}")));
            }
            let seconds: i64 = row[0]
                .parse()
                .map_err(|_| GatewayError::decode(VENUE, format!("bad candle time `{}`", row[0])))?;
            Ok(Candle {
                timestamp: seconds * 1000,
                open: parse_number(VENUE, "open", &row[1])?,
                close: parse_number(VENUE, "close", &row[2])?,
                high: parse_number(VENUE, "high", &row[3])?,
                low: parse_number(VENUE, "low", &row[4])?,
                volume: parse_number(VENUE, "volume", &row[5])?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    candles.reverse();
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    Ok(candles)
}

fn parse_levels(levels: &[[String; 2]]) -> Result<Vec<BookLevel>, GatewayError> {
    levels
        .iter()
        .map(|[price, amount]| -> Result<BookLevel, GatewayError> {
            Ok(BookLevel {
                price: parse_number(VENUE, "price", price)?,
                amount: parse_number(VENUE, "size", amount)?,
            })
        })
        .collect()
}

fn parse_side(side: &str) -> Option<Side> {
    match side {
        "buy" => Some(Side::Buy),
        "sell" => Some(Side::Sell),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ExchangeGateway implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ExchangeGateway for KucoinGateway {
    async fn fetch_balance(&self) -> Result<Balances, GatewayError> {
        let accounts: Vec<KucoinAccount> = self
            .request(Method::GET, "/api/v1/accounts?type=trade", None)
            .await?;

        let mut balances = Balances::default();
        for account in accounts {
            let free = parse_number(VENUE, "available", &account.available)?;
            let used = parse_number(VENUE, "holds", &account.holds)?;
            let entry = balances
                .assets
                .entry(account.currency.to_uppercase())
                .or_insert_with(AssetBalance::default);
            entry.free += free;
            entry.used += used;
        }
        Ok(balances)
    }

    async fn fetch_order_book(&self, pair: &TradingPair) -> Result<OrderBook, GatewayError> {
        let endpoint = format!(
            "/api/v1/market/orderbook/level2_20?symbol={}",
            Self::market_symbol(pair)
        );
        let book: KucoinBook = self.request(Method::GET, &endpoint, None).await?;
        Ok(OrderBook {
            bids: parse_levels(&book.bids)?,
            asks: parse_levels(&book.asks)?,
        })
    }

    async fn fetch_ohlcv(
        &self,
        pair: &TradingPair,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let (Some(kind), Some(step)) = (Self::candle_type(timeframe), timeframe_secs(timeframe))
        else {
            return Err(GatewayError::exchange(
                VENUE,
                format!("unsupported timeframe `{timeframe}`"),
            ));
        };

        let end = Utc::now().timestamp();
        let start = end - step * (limit as i64 + 1);
        let endpoint = format!(
            "/api/v1/market/candles?type={kind}&symbol={}&startAt={start}&endAt={end}",
            Self::market_symbol(pair)
        );
        let rows: Vec<Vec<String>> = self.request(Method::GET, &endpoint, None).await?;
        parse_candles(rows, limit)
    }

    async fn fetch_open_orders(&self, pair: &TradingPair) -> Result<Vec<OpenOrder>, GatewayError> {
        let endpoint = format!(
            "/api/v1/orders?status=active&symbol={}",
            Self::market_symbol(pair)
        );
        let page: KucoinOrderPage = self.request(Method::GET, &endpoint, None).await?;
        page.items
            .into_iter()
            .map(|o| -> Result<OpenOrder, GatewayError> {
                Ok(OpenOrder {
                    side: parse_side(&o.side),
                    price: parse_number(VENUE, "price", &o.price)?,
                    amount: parse_number(VENUE, "size", &o.size)?,
                    id: o.id,
                })
            })
            .collect()
    }

    async fn create_order(
        &self,
        pair: &TradingPair,
        order: &OrderProposal,
    ) -> Result<PlacedOrder, GatewayError> {
        let mut body = json!({
            "clientOid": uuid::Uuid::new_v4().to_string(),
            "side": order.side.as_str(),
            "symbol": Self::market_symbol(pair),
            "type": order.kind.as_str(),
            "size": wire_decimal(VENUE, order.amount)?,
        });
        if order.kind == OrderKind::Limit {
            body["price"] = json!(wire_decimal(VENUE, order.price)?);
        }

        let placed: KucoinOrderId = self
            .request(Method::POST, "/api/v1/orders", Some(body))
            .await?;

        info!(order_id = %placed.order_id, side = %order.side, symbol = %pair, "KuCoin order accepted");

        Ok(PlacedOrder {
            id: placed.order_id,
            side: order.side,
            amount: order.amount,
            price: order.price,
            status: "open".to_string(),
        })
    }

    async fn cancel_order(&self, id: &str, _pair: Option<&TradingPair>) -> Result<(), GatewayError> {
        let endpoint = format!("/api/v1/orders/{}", urlencoding::encode(id));
        let _: serde_json::Value = self.request(Method::DELETE, &endpoint, None).await?;
        Ok(())
    }

    fn requires_symbol_on_cancel(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        VENUE
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
