//! Simulated market data for demo runs.
//!
//! Prices follow a fixed blend of slow and fast waves around a per-symbol
//! base, so a given symbol and timestamp always produce the same bar.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::MarketDataSource;
use crate::types::{Candle, CandleSeries, EngineError, Timeframe};

pub struct SimulatedFeed {
    /// Wave amplitude as a fraction of the base price.
    amplitude: f64,
}

impl SimulatedFeed {
    pub fn new() -> Self {
        Self { amplitude: 0.01 }
    }

    fn base_price(symbol: &str) -> f64 {
        match symbol.to_uppercase().as_str() {
            "BTCUSDT" => 67_000.0,
            "ETHUSDT" => 3_500.0,
            "SOLUSDT" => 150.0,
            "XRPUSDT" => 0.60,
            _ => 100.0,
        }
    }

    /// Per-symbol phase so symbols don't move in lockstep.
    fn phase(symbol: &str) -> f64 {
        symbol.bytes().map(f64::from).sum::<f64>() % 17.0
    }

    pub fn price_at(&self, symbol: &str, at: DateTime<Utc>) -> f64 {
        let t = at.timestamp() as f64;
        let phase = Self::phase(symbol);
        let wave = 0.6 * (t / 5_400.0 + phase).sin()
            + 0.3 * (t / 1_200.0 + 2.0 * phase).sin()
            + 0.1 * (t / 240.0).sin();
        Self::base_price(symbol) * (1.0 + self.amplitude * wave)
    }

    fn volume_at(&self, symbol: &str, at: DateTime<Utc>) -> f64 {
        let t = at.timestamp() as f64;
        100.0 * (1.5 + (t / 2_700.0 + Self::phase(symbol)).sin())
    }

    /// `count` bars ending with the bar that contains `now`.
    pub fn series_at(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<CandleSeries, EngineError> {
        if count == 0 {
            return Err(EngineError::no_data(symbol, "zero candles requested"));
        }
        let step = timeframe.seconds();
        let aligned = now.timestamp() - now.timestamp().rem_euclid(step);
        let last_open = Utc
            .timestamp_opt(aligned, 0)
            .single()
            .ok_or_else(|| EngineError::no_data(symbol, "clock out of range"))?;

        let candles = (0..count)
            .rev()
            .map(|back| {
                let open_time = last_open - Duration::seconds(step * back as i64);
                let open = self.price_at(symbol, open_time);
                let close = self.price_at(symbol, open_time + timeframe.duration());
                let mid = self.price_at(symbol, open_time + Duration::seconds(step / 2));
                Candle {
                    open_time,
                    open,
                    high: open.max(close).max(mid),
                    low: open.min(close).min(mid),
                    close,
                    volume: self.volume_at(symbol, open_time),
                }
            })
            .collect();

        CandleSeries::new(symbol, timeframe, candles)
    }
}

impl Default for SimulatedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for SimulatedFeed {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<CandleSeries, EngineError> {
        self.series_at(symbol, timeframe, count, Utc::now())
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, EngineError> {
        Ok(self.price_at(symbol, Utc::now()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
