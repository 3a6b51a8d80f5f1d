//! Technical indicators over a candle series.
//!
//! Everything here is a pure function of the input closes/volumes. The
//! entry point is [`compute`], which either returns the full
//! [`IndicatorSet`] or fails with `InsufficientData`. It never returns a
//! partially-filled set.

use serde::{Deserialize, Serialize};

use crate::types::{CandleSeries, EngineError, Timeframe};

/// Per-bar volatility assumed when too few returns are available.
pub const DEFAULT_BAR_VOLATILITY: f64 = 0.02;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub ema_short: usize,
    pub ema_long: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
    /// Trailing window for the volume average (current bar included).
    pub volume_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            ema_short: 9,
            ema_long: 21,
            bollinger_period: 20,
            bollinger_std_dev: 2.0,
            volume_period: 20,
        }
    }
}

impl IndicatorConfig {
    /// Longest lookback among the configured indicators.
    pub fn lookback(&self) -> usize {
        [
            self.rsi_period,
            self.macd_slow + self.macd_signal.saturating_sub(1),
            self.ema_long,
            self.bollinger_period,
            self.volume_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Minimum number of candles [`compute`] accepts.
    pub fn min_candles(&self) -> usize {
        self.lookback() + 1
    }
}

// ---------------------------------------------------------------------------
// Indicator set
// ---------------------------------------------------------------------------

/// Indicator values at the last bar of one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub timeframe: Timeframe,
    pub close: f64,
    /// 0-100.
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    /// Price position inside the band. Below 0 or above 1 means a breakout.
    pub bollinger_position: f64,
    /// Current volume over the trailing average.
    pub volume_ratio: f64,
}

impl IndicatorSet {
    /// True when every value is a finite number.
    pub fn is_finite(&self) -> bool {
        [
            self.close,
            self.rsi,
            self.macd_line,
            self.macd_signal,
            self.macd_histogram,
            self.ema_short,
            self.ema_long,
            self.bollinger_upper,
            self.bollinger_lower,
            self.bollinger_position,
            self.volume_ratio,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Compute the full indicator set at the last bar of `series`.
pub fn compute(series: &CandleSeries, cfg: &IndicatorConfig) -> Result<IndicatorSet, EngineError> {
    let needed = cfg.min_candles();
    if series.len() < needed {
        return Err(EngineError::InsufficientData {
            symbol: series.symbol().to_string(),
            timeframe: series.timeframe(),
            needed,
            got: series.len(),
        });
    }

    let closes = series.closes();
    let volumes = series.volumes();
    let close = closes[closes.len() - 1];

    let rsi = wilder_rsi(&closes, cfg.rsi_period);
    let (macd_line, macd_signal, macd_histogram) =
        macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
    let ema_short = last_ema(&closes, cfg.ema_short);
    let ema_long = last_ema(&closes, cfg.ema_long);
    let (bollinger_upper, _, bollinger_lower) =
        bollinger_bands(&closes, cfg.bollinger_period, cfg.bollinger_std_dev);
    let bollinger_position = band_position(close, bollinger_lower, bollinger_upper);
    let volume_ratio = volume_ratio(&volumes, cfg.volume_period);

    Ok(IndicatorSet {
        timeframe: series.timeframe(),
        close,
        rsi,
        macd_line,
        macd_signal,
        macd_histogram,
        ema_short,
        ema_long,
        bollinger_upper,
        bollinger_lower,
        bollinger_position,
        volume_ratio,
    })
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// Exponential moving average over the whole input, seeded with the first
/// value. `alpha = 2 / (period + 1)`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period.max(1) as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            Some(p) => alpha * v + (1.0 - alpha) * p,
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

fn last_ema(values: &[f64], period: usize) -> f64 {
    ema_series(values, period).last().copied().unwrap_or(f64::NAN)
}

/// RSI with Wilder smoothing. Needs at least `period + 1` closes.
pub fn wilder_rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() <= period {
        return f64::NAN;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let n = period as f64;

    let (mut avg_gain, mut avg_loss) = changes[..period].iter().fold((0.0, 0.0), |(g, l), &c| {
        if c > 0.0 {
            (g + c, l)
        } else {
            (g, l - c)
        }
    });
    avg_gain /= n;
    avg_loss /= n;

    for &c in &changes[period..] {
        let (gain, loss) = if c > 0.0 { (c, 0.0) } else { (0.0, -c) };
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
    }

    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// MACD line, signal line and histogram at the last bar.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> (f64, f64, f64) {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema_series(&line, signal);

    let m = line.last().copied().unwrap_or(f64::NAN);
    let s = signal_line.last().copied().unwrap_or(f64::NAN);
    (m, s, m - s)
}

/// Upper, middle and lower Bollinger bands over the last `period` closes.
/// Uses the sample standard deviation.
pub fn bollinger_bands(closes: &[f64], period: usize, std_devs: f64) -> (f64, f64, f64) {
    if period == 0 || closes.len() < period {
        return (f64::NAN, f64::NAN, f64::NAN);
    }
    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let sd = sample_std_dev(window).unwrap_or(0.0);
    (mean + std_devs * sd, mean, mean - std_devs * sd)
}

/// `(price - lower) / (upper - lower)`, unclamped. A collapsed band is 0.5.
pub fn band_position(price: f64, lower: f64, upper: f64) -> f64 {
    let width = upper - lower;
    if width.abs() < f64::EPSILON {
        0.5
    } else {
        (price - lower) / width
    }
}

/// Last volume over the mean of the trailing `period` volumes.
pub fn volume_ratio(volumes: &[f64], period: usize) -> f64 {
    if period == 0 || volumes.len() < period {
        return f64::NAN;
    }
    let window = &volumes[volumes.len() - period..];
    let avg = window.iter().sum::<f64>() / period as f64;
    if avg <= 0.0 {
        return 1.0;
    }
    volumes[volumes.len() - 1] / avg
}

/// Sample standard deviation of bar-to-bar percentage returns over the last
/// `window` returns. `None` with fewer than three returns.
pub fn return_volatility(closes: &[f64], window: usize) -> Option<f64> {
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    let start = returns.len().saturating_sub(window);
    let recent = &returns[start..];
    if recent.len() < 3 {
        return None;
    }
    sample_std_dev(recent)
}

fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
