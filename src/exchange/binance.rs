//! Binance spot integration.
//!
//! API docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
//! Base URL: https://api.binance.com
//! Auth: `X-MBX-APIKEY` header; signed endpoints append
//! `signature = hex(HMAC-SHA256(secret, query))` to the query string.
//! Cancelling an order requires the symbol as well as the order id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::Mac;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::{is_transient, parse_number, timeframe_secs, wire_decimal, ExchangeGateway, HmacSha256};
use crate::config::Credentials;
use crate::types::{
    AssetBalance, Balances, BookLevel, Candle, GatewayError, OpenOrder, OrderBook, OrderKind,
    OrderProposal, PlacedOrder, Side, TradingPair,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://api.binance.com";
const VENUE: &str = "binance";
const RECV_WINDOW_MS: u64 = 5_000;

/// Error codes that mean the order itself was malformed or refused:
/// -1013 filter failure, -1100..=-1130 bad parameters, -2010 new order rejected.
fn is_invalid_order_code(code: i64) -> bool {
    code == -1013 || code == -2010 || (-1130..=-1100).contains(&code)
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct BinanceAccount {
    #[serde(default)]
    balances: Vec<BinanceBalance>,
}

#[derive(Debug, Deserialize)]
struct BinanceBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct BinanceDepth {
    #[serde(default)]
    bids: Vec<[String; 2]>,
    #[serde(default)]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrder {
    order_id: i64,
    #[serde(default)]
    side: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    orig_qty: String,
    #[serde(default)]
    status: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BinanceGateway {
    http: Client,
    base_url: String,
    api_key: SecretString,
    secret: SecretString,
}

impl BinanceGateway {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_base_url(credentials, BASE_URL)
    }

    pub fn with_base_url(credentials: &Credentials, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("AUTOTRADER/0.1.0")
            .build()
            .context("Failed to build HTTP client for Binance")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::new(credentials.api_key.expose_secret().clone()),
            secret: SecretString::new(credentials.secret.expose_secret().clone()),
        })
    }

    /// `BTC/USDT` → `BTCUSDT`.
    fn market_symbol(pair: &TradingPair) -> String {
        format!("{}{}", pair.base, pair.quote).to_uppercase()
    }

    fn signature(secret: &str, query: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| GatewayError::exchange(VENUE, format!("Invalid API secret: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn encode_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    // -- Internal helpers ------------------------------------------------

    /// Send a request; signed requests get `timestamp`, `recvWindow` and
    /// `signature` appended to the query.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
        signed: bool,
    ) -> Result<T, GatewayError> {
        if signed {
            params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
            params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        }
        let mut query = Self::encode_query(&params);
        if signed {
            let signature = Self::signature(self.secret.expose_secret(), &query)?;
            query.push_str(&format!("&signature={signature}"));
        }

        debug!(method = %method, path, "Binance request");

        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };
        let resp = self
            .http
            .request(method, url)
            .header("X-MBX-APIKEY", self.api_key.expose_secret().as_str())
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
        if !status.is_success() {
            return Err(classify_error(&text));
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::decode(VENUE, format!("{e}: {text}")))
    }
}

/// Map a 4xx error body onto the taxonomy.
fn classify_error(text: &str) -> GatewayError {
    match serde_json::from_str::<BinanceErrorBody>(text) {
        Ok(body) if is_invalid_order_code(body.code) => {
            GatewayError::invalid_order(VENUE, format!("{} (code {})", body.msg, body.code))
        }
        Ok(body) => GatewayError::exchange(VENUE, format!("{} (code {})", body.msg, body.code)),
        Err(_) => GatewayError::exchange(VENUE, text.to_string()),
    }
}

/// Rows are `[open_time_ms, "open", "high", "low", "close", "volume", ...]`.
fn parse_klines(rows: Vec<Vec<serde_json::Value>>) -> Result<Vec<Candle>, GatewayError> {
    rows.iter()
        .map(|row| -> Result<Candle, GatewayError> {
            let timestamp = row
                .first()
                .and_then(|v| v.as_i64())
                .ok_or_else(|| GatewayError::decode(VENUE, "kline missing open time"))?;
            Ok(Candle {
                timestamp,
                open: kline_field(row, 1, "open")?,
                high: kline_field(row, 2, "high")?,
                low: kline_field(row, 3, "low")?,
                close: kline_field(row, 4, "close")?,
                volume: kline_field(row, 5, "volume")?,
            })
        })
        .collect()
}

fn kline_field(row: &[serde_json::Value], index: usize, name: &str) -> Result<f64, GatewayError> {
    match row.get(index) {
        Some(serde_json::Value::String(s)) => parse_number(VENUE, name, s),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| GatewayError::decode(VENUE, format!("{name} out of range"))),
        _ => Err(GatewayError::decode(VENUE, format!("kline missing {name}"))),
    }
}

fn parse_levels(levels: &[[String; 2]]) -> Result<Vec<BookLevel>, GatewayError> {
    levels
        .iter()
        .map(|[price, qty]| -> Result<BookLevel, GatewayError> {
            Ok(BookLevel {
                price: parse_number(VENUE, "price", price)?,
                amount: parse_number(VENUE, "qty", qty)?,
            })
        })
        .collect()
}

fn parse_side(side: &str) -> Option<Side> {
    match side {
        "BUY" => Some(Side::Buy),
        "SELL" => Some(Side::Sell),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ExchangeGateway implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn fetch_balance(&self) -> Result<Balances, GatewayError> {
        let account: BinanceAccount = self
            .request(Method::GET, "/api/v3/account", Vec::new(), true)
            .await?;

        let mut balances = Balances::default();
        for b in account.balances {
            balances.insert(
                b.asset,
                AssetBalance {
                    free: parse_number(VENUE, "free", &b.free)?,
                    used: parse_number(VENUE, "locked", &b.locked)?,
                },
            );
        }
        Ok(balances)
    }

    async fn fetch_order_book(&self, pair: &TradingPair) -> Result<OrderBook, GatewayError> {
        let params = vec![
            ("symbol", Self::market_symbol(pair)),
            ("limit", "20".to_string()),
        ];
        let depth: BinanceDepth = self
            .request(Method::GET, "/api/v3/depth", params, false)
            .await?;
        Ok(OrderBook {
            bids: parse_levels(&depth.bids)?,
            asks: parse_levels(&depth.asks)?,
        })
    }

    async fn fetch_ohlcv(
        &self,
        pair: &TradingPair,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        if timeframe_secs(timeframe).is_none() {
            return Err(GatewayError::exchange(
                VENUE,
                format!("unsupported timeframe `{timeframe}`"),
            ));
        }
        let params = vec![
            ("symbol", Self::market_symbol(pair)),
            ("interval", timeframe.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> = self
            .request(Method::GET, "/api/v3/klines", params, false)
            .await?;
        parse_klines(rows)
    }

    async fn fetch_open_orders(&self, pair: &TradingPair) -> Result<Vec<OpenOrder>, GatewayError> {
        let params = vec![("symbol", Self::market_symbol(pair))];
        let orders: Vec<BinanceOrder> = self
            .request(Method::GET, "/api/v3/openOrders", params, true)
            .await?;
        orders
            .into_iter()
            .map(|o| -> Result<OpenOrder, GatewayError> {
                Ok(OpenOrder {
                    id: o.order_id.to_string(),
                    side: parse_side(&o.side),
                    price: parse_number(VENUE, "price", &o.price)?,
                    amount: parse_number(VENUE, "origQty", &o.orig_qty)?,
                })
            })
            .collect()
    }

    async fn create_order(
        &self,
        pair: &TradingPair,
        order: &OrderProposal,
    ) -> Result<PlacedOrder, GatewayError> {
        let mut params = vec![
            ("symbol", Self::market_symbol(pair)),
            ("side", order.side.as_str().to_uppercase()),
            ("type", order.kind.as_str().to_uppercase()),
        ];
        if order.kind == OrderKind::Limit {
            params.push(("timeInForce", "GTC".to_string()));
        }
        params.push(("quantity", wire_decimal(VENUE, order.amount)?));
        if order.kind == OrderKind::Limit {
            params.push(("price", wire_decimal(VENUE, order.price)?));
        }

        let placed: BinanceOrder = self
            .request(Method::POST, "/api/v3/order", params, true)
            .await?;

        info!(order_id = placed.order_id, side = %order.side, symbol = %pair, "Binance order accepted");

        Ok(PlacedOrder {
            id: placed.order_id.to_string(),
            side: order.side,
            amount: order.amount,
            price: order.price,
            status: placed.status.to_lowercase(),
        })
    }

    async fn cancel_order(&self, id: &str, pair: Option<&TradingPair>) -> Result<(), GatewayError> {
        let pair = pair.ok_or_else(|| {
            GatewayError::invalid_order(VENUE, format!("cancel of {id} needs the symbol"))
        })?;
        let params = vec![
            ("symbol", Self::market_symbol(pair)),
            ("orderId", id.to_string()),
        ];
        let _: serde_json::Value = self
            .request(Method::DELETE, "/api/v3/order", params, true)
            .await?;
        Ok(())
    }

    fn requires_symbol_on_cancel(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        VENUE
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_known_vector() {
        let query = BinanceGateway::encode_query(&[
            ("symbol", "BTCUSDT".to_string()),
            ("side", "BUY".to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", "1.5".to_string()),
            ("price", "99".to_string()),
            ("timestamp", "1700000000000".to_string()),
        ]);
        assert_eq!(
            BinanceGateway::signature("secret", &query).unwrap(),
            "5ef0bbc481816210580fc476aa20691028671f92a5913702d6e499c50fd48da0"
        );
    }

    #[test]
    fn test_cancel_requires_symbol() {
        let gw = BinanceGateway::new(&Credentials {
            api_key: SecretString::new("k".into()),
            secret: SecretString::new("s".into()),
            passphrase: SecretString::new(String::new()),
        })
        .unwrap();
        assert!(gw.requires_symbol_on_cancel());
        assert_eq!(
            BinanceGateway::market_symbol(&TradingPair::new("eth", "btc")),
            "ETHBTC"
        );
    }

    #[test]
    fn test_error_classification() {
        let e = classify_error(r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#);
        assert!(matches!(e, GatewayError::InvalidOrder { .. }));
        let e = classify_error(r#"{"code":-1111,"msg":"Precision is over the maximum"}"#);
        assert!(matches!(e, GatewayError::InvalidOrder { .. }));
        let e = classify_error(r#"{"code":-2015,"msg":"Invalid API-key"}"#);
        assert!(matches!(e, GatewayError::Exchange { .. }));
        let e = classify_error("Forbidden");
        assert!(matches!(e, GatewayError::Exchange { .. }));
    }

    #[test]
    fn test_parse_klines() {
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(
            r#"[[1700000000000,"1.0","2.0","0.5","1.5","10.0",1700000059999,"15.0",3,"5","7","0"]]"#,
        )
        .unwrap();
        let candles = parse_klines(rows).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
        assert_eq!(candles[0].high, 2.0);
        assert_eq!(candles[0].close, 1.5);
        assert_eq!(candles[0].volume, 10.0);

        let short: Vec<Vec<serde_json::Value>> = serde_json::from_str(r#"[[1700000000000,"1.0"]]"#).unwrap();
        assert!(matches!(parse_klines(short), Err(GatewayError::Decode { .. })));
    }
}
