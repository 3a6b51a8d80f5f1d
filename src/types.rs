//! Shared types for the AUGUR decision engine.
//!
//! These types form the data model used across all modules. Each one is
//! produced by exactly one stage of the pipeline and read by the stages
//! downstream of it; nothing here is mutated once built.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// Bar duration of a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::Min1,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Hour1,
        Timeframe::Hour4,
    ];

    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60,
            Timeframe::Min5 => 300,
            Timeframe::Min15 => 900,
            Timeframe::Hour1 => 3_600,
            Timeframe::Hour4 => 14_400,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Exchange-style interval label ("5m", "1h", ...).
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown timeframe: {s}"))
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered bars for one symbol and timeframe.
///
/// Construction checks that timestamps strictly increase by exactly one
/// bar duration, so every consumer can rely on a gap-free series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleSeries {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<Self, EngineError> {
        let symbol = symbol.into();
        let step = timeframe.duration();
        for pair in candles.windows(2) {
            let gap = pair[1].open_time - pair[0].open_time;
            if gap <= Duration::zero() {
                return Err(EngineError::InvalidSeries(format!(
                    "{symbol} {timeframe}: timestamps not strictly increasing at {}",
                    pair[1].open_time
                )));
            }
            if gap != step {
                return Err(EngineError::InvalidSeries(format!(
                    "{symbol} {timeframe}: bar spacing {}s, expected {}s at {}",
                    gap.num_seconds(),
                    step.num_seconds(),
                    pair[1].open_time
                )));
            }
        }
        Ok(Self {
            symbol,
            timeframe,
            candles,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

// ---------------------------------------------------------------------------
// Signal direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    /// +1 for bullish, -1 for bearish, 0 for neutral.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Direction::Bullish
        } else if value < 0.0 {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
            Direction::Neutral => write!(f, "neutral"),
        }
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// Contract terms of a listed market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarketKind {
    /// YES resolves when the price ends above `strike_price`.
    Binary { strike_price: Decimal },
    /// LOW below `lower`, MID in `[lower, upper]`, HIGH above `upper`.
    Interval { lower: Decimal, upper: Decimal },
}

impl MarketKind {
    pub fn label(&self) -> &'static str {
        match self {
            MarketKind::Binary { .. } => "binary",
            MarketKind::Interval { .. } => "interval",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Scheduled,
    Open,
    Closed,
    Resolved,
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Scheduled => write!(f, "scheduled"),
            MarketStatus::Open => write!(f, "open"),
            MarketStatus::Closed => write!(f, "closed"),
            MarketStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// A listed market instance, as discovered by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMarket {
    pub market_id: String,
    /// Exchange symbol, e.g. "BTCUSDT".
    pub symbol: String,
    pub question: String,
    pub kind: MarketKind,
    pub open_at: DateTime<Utc>,
    /// Betting stops here.
    pub close_at: DateTime<Utc>,
    /// Price is read for settlement here.
    pub resolve_at: DateTime<Utc>,
    /// Status last reported by the catalog.
    pub status: MarketStatus,
}

impl ActiveMarket {
    /// Status at `now`, by wall-clock comparison against the market's
    /// timestamps. A closed or resolved report from the catalog is final.
    pub fn status_at(&self, now: DateTime<Utc>) -> MarketStatus {
        let by_clock = if now >= self.resolve_at {
            MarketStatus::Resolved
        } else if now >= self.close_at {
            MarketStatus::Closed
        } else if now >= self.open_at {
            MarketStatus::Open
        } else {
            MarketStatus::Scheduled
        };

        match (self.status, by_clock) {
            (MarketStatus::Resolved, _) => MarketStatus::Resolved,
            (MarketStatus::Closed, MarketStatus::Resolved) => MarketStatus::Resolved,
            (MarketStatus::Closed, _) => MarketStatus::Closed,
            (_, clock) => clock,
        }
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == MarketStatus::Open
    }

    /// Time from `now` until settlement.
    pub fn time_to_resolve(&self, now: DateTime<Utc>) -> Duration {
        self.resolve_at - now
    }

    pub fn strike_f64(&self) -> Option<f64> {
        match &self.kind {
            MarketKind::Binary { strike_price } => strike_price.to_f64(),
            MarketKind::Interval { .. } => None,
        }
    }
}

impl fmt::Display for ActiveMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MarketKind::Binary { strike_price } => write!(
                f,
                "[{}] {} > ${} (resolves {})",
                self.market_id,
                self.symbol,
                strike_price,
                self.resolve_at.format("%H:%M UTC")
            ),
            MarketKind::Interval { lower, upper } => write!(
                f,
                "[{}] {} ${}-${} (resolves {})",
                self.market_id,
                self.symbol,
                lower,
                upper,
                self.resolve_at.format("%H:%M UTC")
            ),
        }
    }
}

/// Market-implied probabilities, derived from crowd volumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarketOdds {
    Binary { yes_price: f64, no_price: f64 },
    Interval { low: f64, mid: f64, high: f64 },
}

impl MarketOdds {
    /// Binary odds from YES/NO volumes. `None` when nothing has traded.
    pub fn from_binary_volumes(yes_volume: f64, no_volume: f64) -> Option<Self> {
        let total = yes_volume + no_volume;
        if !(total > 0.0) {
            return None;
        }
        Some(MarketOdds::Binary {
            yes_price: yes_volume / total,
            no_price: no_volume / total,
        })
    }

    /// Interval odds from LOW/MID/HIGH volumes. `None` when nothing has traded.
    pub fn from_interval_volumes(low: f64, mid: f64, high: f64) -> Option<Self> {
        let total = low + mid + high;
        if !(total > 0.0) {
            return None;
        }
        Some(MarketOdds::Interval {
            low: low / total,
            mid: mid / total,
            high: high / total,
        })
    }

    /// Implied probability of one outcome, if these odds cover it.
    pub fn implied(&self, signal: BetSignal) -> Option<f64> {
        match (self, signal) {
            (MarketOdds::Binary { yes_price, .. }, BetSignal::Yes) => Some(*yes_price),
            (MarketOdds::Binary { no_price, .. }, BetSignal::No) => Some(*no_price),
            (MarketOdds::Interval { low, .. }, BetSignal::Low) => Some(*low),
            (MarketOdds::Interval { mid, .. }, BetSignal::Mid) => Some(*mid),
            (MarketOdds::Interval { high, .. }, BetSignal::High) => Some(*high),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// The recommendation carried by a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetSignal {
    Yes,
    No,
    Low,
    Mid,
    High,
    /// No directional view.
    Hold,
}

impl fmt::Display for BetSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetSignal::Yes => write!(f, "YES"),
            BetSignal::No => write!(f, "NO"),
            BetSignal::Low => write!(f, "LOW"),
            BetSignal::Mid => write!(f, "MID"),
            BetSignal::High => write!(f, "HIGH"),
            BetSignal::Hold => write!(f, "HOLD"),
        }
    }
}

impl FromStr for BetSignal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YES" => Ok(BetSignal::Yes),
            "NO" => Ok(BetSignal::No),
            "LOW" => Ok(BetSignal::Low),
            "MID" => Ok(BetSignal::Mid),
            "HIGH" => Ok(BetSignal::High),
            "HOLD" => Ok(BetSignal::Hold),
            other => Err(anyhow::anyhow!("Unknown signal: {other}")),
        }
    }
}

/// Non-fatal conditions downstream consumers should discount for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionFlag {
    /// Calibration is cold-start identity or older than its max age.
    StaleCalibration,
    /// Market odds were unavailable; edge is against a neutral prior.
    NeutralOddsPrior,
    /// No open market matched the symbol.
    NoMatchedMarket,
}

/// One reason a decision was judged not bettable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum GateFailure {
    NoMatchedMarket,
    BelowMinimumBuffer { distance: f64, buffer: f64 },
    WithinVolatilityBand { distance_pct: f64, required_pct: f64 },
    InsufficientEdge { edge: f64, min_edge: f64 },
    OutsideAlertWindow { minute: u32, start: u32, end: u32 },
    TooFarFromClose { minutes_to_close: i64, max_minutes: i64 },
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::NoMatchedMarket => write!(f, "No open market for symbol"),
            GateFailure::BelowMinimumBuffer { distance, buffer } => write!(
                f,
                "Distance to strike {distance:.4} below minimum buffer {buffer:.4}"
            ),
            GateFailure::WithinVolatilityBand {
                distance_pct,
                required_pct,
            } => write!(
                f,
                "Distance {:.3}% within volatility band {:.3}%",
                distance_pct * 100.0,
                required_pct * 100.0
            ),
            GateFailure::InsufficientEdge { edge, min_edge } => write!(
                f,
                "Edge {:.1}% below minimum {:.1}%",
                edge * 100.0,
                min_edge * 100.0
            ),
            GateFailure::OutsideAlertWindow { minute, start, end } => write!(
                f,
                "Minute :{minute:02} outside alert window :{start:02}-:{end:02}"
            ),
            GateFailure::TooFarFromClose {
                minutes_to_close,
                max_minutes,
            } => write!(
                f,
                "Market closes in {minutes_to_close} min, more than {max_minutes} min away"
            ),
        }
    }
}

/// The immutable outcome of one symbol's decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: Uuid,
    pub symbol: String,
    pub signal: BetSignal,
    /// Second-most-likely band for interval markets.
    pub backup_signal: Option<BetSignal>,
    /// Fused probability before calibration.
    pub p_raw: f64,
    /// Calibrated probability of YES, i.e. of the price finishing higher.
    pub p_yes: f64,
    /// Probability of the chosen band. Interval markets only.
    #[serde(default)]
    pub band_probability: Option<f64>,
    pub edge: f64,
    pub ev: f64,
    pub is_bettable: bool,
    pub gate_failures: Vec<GateFailure>,
    /// Signed strike (or nearest band boundary) minus current price.
    pub distance_to_strike: Option<f64>,
    /// Return standard deviation over the exposure horizon, as a fraction.
    pub volatility: f64,
    pub current_price: f64,
    pub predicted_price: Option<f64>,
    pub agreement: usize,
    pub reasons: Vec<String>,
    pub matched_market_id: Option<String>,
    pub market_kind: Option<String>,
    pub resolve_at: Option<DateTime<Utc>>,
    pub flags: Vec<DecisionFlag>,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn has_flag(&self, flag: DecisionFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Probability the recommended side wins.
    pub fn win_probability(&self) -> f64 {
        match self.signal {
            BetSignal::Yes => self.p_yes,
            BetSignal::No => 1.0 - self.p_yes,
            BetSignal::Low | BetSignal::Mid | BetSignal::High => {
                self.band_probability.unwrap_or(self.p_yes)
            }
            BetSignal::Hold => self.p_yes.max(1.0 - self.p_yes),
        }
    }
}

impl fmt::Display for DecisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} p={:.3} edge={:+.1}% ev={:+.3} {}",
            self.symbol,
            self.signal,
            self.p_yes,
            self.edge * 100.0,
            self.ev,
            if self.is_bettable { "BETTABLE" } else { "skip" }
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that end one symbol's decision cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Insufficient data for {symbol} {timeframe}: need {needed} candles, got {got}")]
    InsufficientData {
        symbol: String,
        timeframe: Timeframe,
        needed: usize,
        got: usize,
    },

    #[error("No data for {symbol}: {detail}")]
    NoData { symbol: String, detail: String },

    #[error("Invalid candle series: {0}")]
    InvalidSeries(String),

    #[error("Market catalog error: {0}")]
    Catalog(String),

    #[error("Calibration error: {0}")]
    Calibration(String),
}

impl EngineError {
    pub fn no_data(symbol: &str, detail: impl Into<String>) -> Self {
        EngineError::NoData {
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
