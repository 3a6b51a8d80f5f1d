//! Candle replay.
//!
//! Serves recorded candles to the engine as if the clock stood at a movable
//! cursor. Only bars that had closed by the cursor are visible, so a replayed
//! cycle sees exactly what a live cycle at that instant would have seen.
//! Doubles as the catalog: lists the hourly binary market on the venue's
//! cadence with its strike taken from the replayed price at the open.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::data::MarketDataSource;
use crate::platforms::schedule::binary_window;
use crate::platforms::MarketCatalog;
use crate::types::{
    ActiveMarket, BetSignal, Candle, CandleSeries, EngineError, MarketKind, MarketOdds, MarketStatus,
    Timeframe,
};

pub struct ReplayFeed {
    history: HashMap<(String, Timeframe), Vec<Candle>>,
    cursor: RwLock<DateTime<Utc>>,
}

impl ReplayFeed {
    /// Build from full recorded series. The cursor starts at `start`.
    pub fn new(series: Vec<CandleSeries>, start: DateTime<Utc>) -> Self {
        let history = series
            .into_iter()
            .map(|s| {
                (
                    (s.symbol().to_uppercase(), s.timeframe()),
                    s.candles().to_vec(),
                )
            })
            .collect();
        Self {
            history,
            cursor: RwLock::new(start),
        }
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        match self.cursor.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_cursor(&self, at: DateTime<Utc>) {
        match self.cursor.write() {
            Ok(mut guard) => *guard = at,
            Err(poisoned) => *poisoned.into_inner() = at,
        }
    }

    /// Recorded symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.history.keys().map(|(s, _)| s.clone()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Bars of the finest recorded timeframe for `symbol`.
    fn finest(&self, symbol: &str) -> Option<(Timeframe, &[Candle])> {
        self.history
            .iter()
            .filter(|((s, _), _)| s == symbol)
            .min_by_key(|((_, tf), _)| tf.seconds())
            .map(|((_, tf), bars)| (*tf, bars.as_slice()))
    }

    /// Close of the last bar that had closed by `at`. `None` when the
    /// recording ends before `at` or starts after it.
    pub fn price_at(&self, symbol: &str, at: DateTime<Utc>) -> Option<f64> {
        let symbol = symbol.to_uppercase();
        let (tf, bars) = self.finest(&symbol)?;
        let last = bars.last()?;
        if last.open_time + tf.duration() < at {
            return None;
        }
        bars.iter()
            .take_while(|c| c.open_time + tf.duration() <= at)
            .last()
            .map(|c| c.close)
    }

    /// The hourly binary market open at `at`, if the venue would list one.
    pub fn markets_at(&self, symbol: &str, at: DateTime<Utc>) -> Result<Vec<ActiveMarket>, EngineError> {
        let symbol = symbol.to_uppercase();
        let window = binary_window(at);
        if !window.contains(at) {
            return Ok(Vec::new());
        }
        let Some(open_price) = self.price_at(&symbol, window.open_at) else {
            return Ok(Vec::new());
        };
        let strike = Decimal::from_f64(open_price)
            .map(|d| d.round_dp(if open_price >= 100.0 { 0 } else { 2 }))
            .ok_or_else(|| EngineError::Catalog(format!("unrepresentable price {open_price}")))?;

        Ok(vec![ActiveMarket {
            market_id: format!("{symbol}-binary-{}", window.resolve_at.format("%Y%m%d%H")),
            question: format!("Will {symbol} be above ${strike} at {}?", window.resolve_at.format("%H:%M UTC")),
            symbol,
            kind: MarketKind::Binary { strike_price: strike },
            open_at: window.open_at,
            close_at: window.close_at,
            resolve_at: window.resolve_at,
            status: MarketStatus::Open,
        }])
    }

    /// Winning side of a binary market from the recorded price at
    /// resolution. `None` for intervals and when the recording ends first.
    pub fn settle(&self, market: &ActiveMarket) -> Option<BetSignal> {
        let MarketKind::Binary { strike_price } = &market.kind else {
            return None;
        };
        let strike = strike_price.to_f64()?;
        let price = self.price_at(&market.symbol, market.resolve_at)?;
        Some(if price > strike { BetSignal::Yes } else { BetSignal::No })
    }
}

#[async_trait]
impl MarketDataSource for ReplayFeed {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<CandleSeries, EngineError> {
        let symbol = symbol.to_uppercase();
        let at = self.cursor();
        let bars = self
            .history
            .get(&(symbol.clone(), timeframe))
            .ok_or_else(|| EngineError::no_data(&symbol, format!("no recorded {timeframe} bars")))?;
        let closed = bars
            .iter()
            .take_while(|c| c.open_time + timeframe.duration() <= at)
            .count();
        if closed == 0 {
            return Err(EngineError::no_data(&symbol, format!("no {timeframe} bar closed by {at}")));
        }
        let from = closed.saturating_sub(count);
        CandleSeries::new(symbol, timeframe, bars[from..closed].to_vec())
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, EngineError> {
        let at = self.cursor();
        self.price_at(symbol, at)
            .ok_or_else(|| EngineError::no_data(symbol, format!("no recorded price at {at}")))
    }
}

#[async_trait]
impl MarketCatalog for ReplayFeed {
    async fn list_active_markets(&self, symbol: &str) -> Result<Vec<ActiveMarket>, EngineError> {
        self.markets_at(symbol, self.cursor())
    }

    /// Historical crowd odds are not recorded; edges are priced against the
    /// neutral prior.
    async fn market_odds(&self, _market: &ActiveMarket) -> Result<Option<MarketOdds>, EngineError> {
        Ok(None)
    }
}
