//! Market data sources.
//!
//! Defines the `MarketDataSource` trait the decision engine reads candles
//! and spot prices through, with a Binance REST implementation and a
//! deterministic simulated feed for demo runs.

pub mod binance;
pub mod simulated;

use async_trait::async_trait;

use crate::types::{CandleSeries, EngineError, Timeframe};

/// Abstraction over OHLCV providers.
///
/// Implementations fail fast with `EngineError::NoData` when the upstream
/// has nothing to return; retries are the caller's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The most recent `count` bars for `symbol`, oldest first.
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<CandleSeries, EngineError>;

    /// Latest traded price for `symbol`.
    async fn get_current_price(&self, symbol: &str) -> Result<f64, EngineError>;
}
