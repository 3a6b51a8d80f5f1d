//! Shared fixtures: a fixed decision time, a candle series with a known
//! indicator outcome, and market builders.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use augur::calibration::{CalibrationHandle, CalibrationParams};
use augur::data::MarketDataSource;
use augur::engine::{DecisionEngine, EngineSettings};
use augur::platforms::MarketCatalog;
use augur::types::{ActiveMarket, Candle, CandleSeries, MarketKind, MarketStatus, Timeframe};

/// Close of the last bar of the bullish fixture.
pub const LAST_CLOSE: f64 = 68_560.0;

/// 14:30 UTC: inside the default alert window, 30 minutes before the
/// hourly binary market resolves.
pub fn make_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap()
}

/// 80 bars of decline then 20 bars of zig-zag recovery ending on a volume
/// spike. Bullish on MACD and EMA ordering on every timeframe; the bearish
/// variant mirrors it.
pub fn make_series(symbol: &str, timeframe: Timeframe, bullish: bool) -> CandleSeries {
    let n = 100usize;
    let pivot = n - 20;
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let x = if i < pivot {
                200.0 - 0.5 * i as f64
            } else {
                let j = i - pivot;
                200.0 - 0.5 * pivot as f64 + 0.6 * j as f64 + if j % 2 == 0 { 1.2 } else { 0.0 }
            };
            let x = if bullish { x } else { 400.0 - x };
            x * 400.0
        })
        .collect();
    let end = make_now() - timeframe.duration();
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                open_time: end - timeframe.duration() * (n - 1 - i) as i32,
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: if i == n - 1 { 40.0 } else { 10.0 },
            }
        })
        .collect();
    CandleSeries::new(symbol, timeframe, candles).unwrap()
}

/// Hourly binary market opened at 14:05, closing 14:50, resolving 15:00.
pub fn make_binary_market(id: &str, symbol: &str, strike: Decimal) -> ActiveMarket {
    let hour = Utc.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap();
    ActiveMarket {
        market_id: id.into(),
        symbol: symbol.into(),
        question: format!("Will {symbol} be above ${strike} at 15:00 UTC?"),
        kind: MarketKind::Binary { strike_price: strike },
        open_at: hour + Duration::minutes(5),
        close_at: hour + Duration::minutes(50),
        resolve_at: hour + Duration::hours(1),
        status: MarketStatus::Open,
    }
}

pub fn fresh_calibration() -> CalibrationHandle {
    CalibrationHandle::new(CalibrationParams {
        fitted_at: Some(make_now()),
        ..CalibrationParams::identity()
    })
}

pub fn make_engine(
    data: Arc<dyn MarketDataSource>,
    catalog: Arc<dyn MarketCatalog>,
    calibration: CalibrationHandle,
) -> Arc<DecisionEngine> {
    Arc::new(DecisionEngine::new(data, catalog, calibration, EngineSettings::default()))
}
