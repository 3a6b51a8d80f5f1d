//! Candle-replay backtesting over the live decision engine.

pub mod replay;
pub mod runner;

use serde::{Deserialize, Serialize};

pub use replay::ReplayFeed;
pub use runner::{BacktestReport, BacktestTrade, Backtester};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Length of the replayed window, ending now.
    pub hours: i64,
    /// Cursor step between replayed cycles.
    pub step_minutes: i64,
    /// Bars fetched per timeframe. Must cover the window plus the
    /// engine's own lookback on the slowest timeframe.
    pub history_candles: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            hours: 24,
            step_minutes: 5,
            history_candles: 1_000,
        }
    }
}
