//! Binance spot market data.
//!
//! API: `GET /api/v3/klines` and `GET /api/v3/ticker/price`
//! Auth: none (public endpoints).
//!
//! Hosts are tried in order; regional blocks on the main host are common,
//! so `api1.binance.com` and `api.binance.us` follow it by default.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::MarketDataSource;
use crate::types::{Candle, CandleSeries, EngineError, Timeframe};

pub const DEFAULT_HOSTS: &[&str] = &[
    "https://api.binance.com",
    "https://api1.binance.com",
    "https://api.binance.us",
];

/// Binance caps a klines request at 1000 bars.
const MAX_KLINES: usize = 1000;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

pub struct BinanceClient {
    http: Client,
    hosts: Vec<String>,
}

impl BinanceClient {
    pub fn new(hosts: Vec<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("AUGUR/0.1.0")
            .build()
            .context("Failed to build Binance HTTP client")?;
        let hosts = if hosts.is_empty() {
            DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect()
        } else {
            hosts
        };
        Ok(Self { http, hosts })
    }

    /// GET `path` against each host in turn; first success wins.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut last_err = None;
        for host in &self.hosts {
            let url = format!("{}{path}", host.trim_end_matches('/'));
            match self.try_get(&url, query).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!(host = %host, path, error = %e, "Binance host failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("No Binance hosts configured")))
    }

    async fn try_get(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .context(format!("Binance request failed: {url}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Binance API error {status} for {url}");
        }

        resp.json::<Value>()
            .await
            .context(format!("Failed to parse Binance response from {url}"))
    }
}

/// Parse a klines payload (array of arrays) into a candle series.
pub fn parse_klines(symbol: &str, timeframe: Timeframe, payload: &Value) -> Result<CandleSeries, EngineError> {
    let rows = payload
        .as_array()
        .ok_or_else(|| EngineError::no_data(symbol, "klines payload is not an array"))?;
    if rows.is_empty() {
        return Err(EngineError::no_data(symbol, format!("no {timeframe} klines returned")));
    }

    let num = |row: &[Value], idx: usize| -> Option<f64> {
        match row.get(idx)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let row = row
            .as_array()
            .ok_or_else(|| EngineError::no_data(symbol, "kline row is not an array"))?
            .as_slice();
        let open_ms = row
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| EngineError::no_data(symbol, "kline row missing open time"))?;
        let open_time = Utc
            .timestamp_millis_opt(open_ms)
            .single()
            .ok_or_else(|| EngineError::no_data(symbol, format!("bad kline timestamp {open_ms}")))?;
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
            (num(row, 1), num(row, 2), num(row, 3), num(row, 4), num(row, 5))
        else {
            return Err(EngineError::no_data(symbol, format!("malformed kline at {open_time}")));
        };
        candles.push(Candle {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    CandleSeries::new(symbol, timeframe, candles)
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<CandleSeries, EngineError> {
        let limit = count.clamp(1, MAX_KLINES);
        let query = [
            ("symbol", symbol.to_uppercase()),
            ("interval", timeframe.label().to_string()),
            ("limit", limit.to_string()),
        ];
        let payload = self
            .get_json("/api/v3/klines", &query)
            .await
            .map_err(|e| EngineError::no_data(symbol, format!("{e:#}")))?;

        let series = parse_klines(symbol, timeframe, &payload)?;
        debug!(symbol, timeframe = %timeframe, bars = series.len(), "Fetched klines");
        Ok(series)
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, EngineError> {
        let query = [("symbol", symbol.to_uppercase())];
        let payload = self
            .get_json("/api/v3/ticker/price", &query)
            .await
            .map_err(|e| EngineError::no_data(symbol, format!("{e:#}")))?;

        let ticker: TickerPrice = serde_json::from_value(payload)
            .map_err(|e| EngineError::no_data(symbol, format!("bad ticker payload: {e}")))?;
        ticker
            .price
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| EngineError::no_data(symbol, format!("bad ticker price {}", ticker.price)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
