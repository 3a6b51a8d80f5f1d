//! Timeframe scorer: one indicator set in, one directional score out.
//!
//! Only indicators past their thresholds vote. Readings in the neutral zone
//! stay silent, so a quiet market scores magnitude 0 rather than a weak
//! lean. Volume never votes on its own; a spike only amplifies the votes
//! already cast.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::indicators::IndicatorSet;
use crate::types::{Direction, Timeframe};

/// RSI, MACD, EMA ordering and Bollinger position.
pub const VOTING_INDICATORS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub bollinger_lower: f64,
    pub bollinger_upper: f64,
    /// Volume ratio above which a spike confirms the existing vote.
    pub volume_spike: f64,
    /// Magnitude multiplier applied on a confirming spike.
    pub volume_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bollinger_lower: 0.1,
            bollinger_upper: 0.9,
            volume_spike: 1.5,
            volume_multiplier: 1.25,
        }
    }
}

/// Ranking of a reason within its timeframe. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Significance {
    RsiExtreme,
    BollingerBreakout,
    MacdMomentum,
    EmaTrend,
    VolumeConfirmation,
}

/// One human-readable indicator fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub significance: Significance,
    pub direction: Direction,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeScore {
    pub timeframe: Timeframe,
    pub direction: Direction,
    /// 0.0-1.0
    pub magnitude: f64,
    /// Configured fusion weight, before renormalization.
    pub weight: f64,
    /// False when the indicators contained non-finite values.
    pub valid: bool,
    pub bullish_votes: usize,
    pub bearish_votes: usize,
    pub reasons: Vec<Reason>,
}

impl TimeframeScore {
    /// Magnitude carrying the direction's sign.
    pub fn signed(&self) -> f64 {
        self.direction.sign() * self.magnitude
    }

    fn invalid(timeframe: Timeframe, weight: f64) -> Self {
        Self {
            timeframe,
            direction: Direction::Neutral,
            magnitude: 0.0,
            weight,
            valid: false,
            bullish_votes: 0,
            bearish_votes: 0,
            reasons: Vec::new(),
        }
    }
}

pub struct TimeframeScorer {
    config: ScoringConfig,
}

impl TimeframeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one timeframe's indicators.
    pub fn score(&self, set: &IndicatorSet, weight: f64) -> TimeframeScore {
        if !set.is_finite() {
            debug!(timeframe = %set.timeframe, "Non-finite indicators, score invalid");
            return TimeframeScore::invalid(set.timeframe, weight);
        }

        let cfg = &self.config;
        let mut reasons = Vec::new();

        if set.rsi < cfg.rsi_oversold {
            reasons.push(Reason {
                significance: Significance::RsiExtreme,
                direction: Direction::Bullish,
                text: format!("RSI oversold ({:.1})", set.rsi),
            });
        } else if set.rsi > cfg.rsi_overbought {
            reasons.push(Reason {
                significance: Significance::RsiExtreme,
                direction: Direction::Bearish,
                text: format!("RSI overbought ({:.1})", set.rsi),
            });
        }

        if set.bollinger_position < cfg.bollinger_lower {
            reasons.push(Reason {
                significance: Significance::BollingerBreakout,
                direction: Direction::Bullish,
                text: format!("Price at lower Bollinger band ({:.2})", set.bollinger_position),
            });
        } else if set.bollinger_position > cfg.bollinger_upper {
            reasons.push(Reason {
                significance: Significance::BollingerBreakout,
                direction: Direction::Bearish,
                text: format!("Price at upper Bollinger band ({:.2})", set.bollinger_position),
            });
        }

        if set.macd_histogram > 0.0 {
            reasons.push(Reason {
                significance: Significance::MacdMomentum,
                direction: Direction::Bullish,
                text: format!("MACD bullish (histogram {:+.4})", set.macd_histogram),
            });
        } else if set.macd_histogram < 0.0 {
            reasons.push(Reason {
                significance: Significance::MacdMomentum,
                direction: Direction::Bearish,
                text: format!("MACD bearish (histogram {:+.4})", set.macd_histogram),
            });
        }

        if set.ema_short > set.ema_long {
            reasons.push(Reason {
                significance: Significance::EmaTrend,
                direction: Direction::Bullish,
                text: format!("EMA short above long ({:.2} > {:.2})", set.ema_short, set.ema_long),
            });
        } else if set.ema_short < set.ema_long {
            reasons.push(Reason {
                significance: Significance::EmaTrend,
                direction: Direction::Bearish,
                text: format!("EMA short below long ({:.2} < {:.2})", set.ema_short, set.ema_long),
            });
        }

        let bullish_votes = reasons.iter().filter(|r| r.direction == Direction::Bullish).count();
        let bearish_votes = reasons.iter().filter(|r| r.direction == Direction::Bearish).count();

        let direction = match bullish_votes.cmp(&bearish_votes) {
            std::cmp::Ordering::Greater => Direction::Bullish,
            std::cmp::Ordering::Less => Direction::Bearish,
            std::cmp::Ordering::Equal => Direction::Neutral,
        };

        let net = bullish_votes.abs_diff(bearish_votes);
        let mut magnitude = net as f64 / VOTING_INDICATORS as f64;

        if direction != Direction::Neutral && set.volume_ratio > cfg.volume_spike {
            magnitude *= cfg.volume_multiplier;
            reasons.push(Reason {
                significance: Significance::VolumeConfirmation,
                direction,
                text: format!("Volume spike confirms ({:.1}x average)", set.volume_ratio),
            });
        }
        let magnitude = magnitude.clamp(0.0, 1.0);

        debug!(
            timeframe = %set.timeframe,
            bullish_votes,
            bearish_votes,
            magnitude = format!("{magnitude:.3}"),
            direction = %direction,
            "Timeframe scored"
        );

        TimeframeScore {
            timeframe: set.timeframe,
            direction,
            magnitude,
            weight,
            valid: true,
            bullish_votes,
            bearish_votes,
            reasons,
        }
    }
}

impl Default for TimeframeScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
