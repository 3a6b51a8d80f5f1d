//! Mock collaborators for integration testing.
//!
//! Deterministic `MarketDataSource` and `MarketCatalog` implementations
//! whose candles, prices, markets and odds are fully controllable from
//! test code, all in-memory with no external dependencies.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use augur::data::MarketDataSource;
use augur::platforms::MarketCatalog;
use augur::types::{ActiveMarket, CandleSeries, EngineError, MarketOdds, Timeframe};

use crate::fixtures::{make_series, LAST_CLOSE};

/// A mock OHLCV provider. Every symbol gets the bullish fixture series
/// unless told otherwise.
pub struct MockDataSource {
    prices: Arc<Mutex<HashMap<String, f64>>>,
    bearish: Arc<Mutex<HashSet<String>>>,
    missing_timeframes: Arc<Mutex<HashSet<Timeframe>>>,
    /// Symbols whose every call fails.
    failing: Arc<Mutex<HashSet<String>>>,
    /// If set, all calls for every symbol return this error.
    force_error: Arc<Mutex<Option<String>>>,
    candle_calls: Arc<Mutex<usize>>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self {
            prices: Arc::new(Mutex::new(HashMap::new())),
            bearish: Arc::new(Mutex::new(HashSet::new())),
            missing_timeframes: Arc::new(Mutex::new(HashSet::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            force_error: Arc::new(Mutex::new(None)),
            candle_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_bearish(&self, symbol: &str) {
        self.bearish.lock().unwrap().insert(symbol.to_string());
    }

    pub fn drop_timeframe(&self, timeframe: Timeframe) {
        self.missing_timeframes.lock().unwrap().insert(timeframe);
    }

    pub fn fail_symbol(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }

    /// Force all subsequent calls to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn candle_calls(&self) -> usize {
        *self.candle_calls.lock().unwrap()
    }

    fn check(&self, symbol: &str) -> Result<(), EngineError> {
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(EngineError::no_data(symbol, msg.clone()));
        }
        if self.failing.lock().unwrap().contains(symbol) {
            return Err(EngineError::no_data(symbol, "upstream unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataSource for MockDataSource {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _count: usize,
    ) -> Result<CandleSeries, EngineError> {
        *self.candle_calls.lock().unwrap() += 1;
        self.check(symbol)?;
        if self.missing_timeframes.lock().unwrap().contains(&timeframe) {
            return Err(EngineError::no_data(symbol, format!("no {timeframe} bars")));
        }
        let bullish = !self.bearish.lock().unwrap().contains(symbol);
        Ok(make_series(symbol, timeframe, bullish))
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, EngineError> {
        self.check(symbol)?;
        Ok(self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(LAST_CLOSE))
    }
}

/// A mock market catalog. Lists the markets registered for the requested
/// symbol and quotes the odds registered per market id.
pub struct MockCatalog {
    markets: Arc<Mutex<Vec<ActiveMarket>>>,
    odds: Arc<Mutex<HashMap<String, MarketOdds>>>,
    /// If set, listing markets returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            markets: Arc::new(Mutex::new(Vec::new())),
            odds: Arc::new(Mutex::new(HashMap::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_market(market: ActiveMarket, odds: Option<MarketOdds>) -> Self {
        let catalog = Self::new();
        catalog.add_market(market, odds);
        catalog
    }

    pub fn add_market(&self, market: ActiveMarket, odds: Option<MarketOdds>) {
        if let Some(odds) = odds {
            self.odds.lock().unwrap().insert(market.market_id.clone(), odds);
        }
        self.markets.lock().unwrap().push(market);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl MarketCatalog for MockCatalog {
    async fn list_active_markets(&self, symbol: &str) -> Result<Vec<ActiveMarket>, EngineError> {
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(EngineError::Catalog(msg.clone()));
        }
        Ok(self
            .markets
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .collect())
    }

    async fn market_odds(&self, market: &ActiveMarket) -> Result<Option<MarketOdds>, EngineError> {
        Ok(self.odds.lock().unwrap().get(&market.market_id).cloned())
    }
}
