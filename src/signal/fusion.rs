//! Multi-timeframe fusion.
//!
//! Weighted sum of signed magnitudes over the available timeframes, with
//! weights renormalized to 1.0. Unless enough timeframes agree with the
//! dominant direction the result is pinned to 0.5.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scorer::TimeframeScore;
use crate::types::{Direction, Timeframe};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Sigmoid steepness applied to the net score.
    pub steepness: f64,
    /// Timeframes that must agree with the dominant direction.
    pub min_agreement: usize,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            steepness: 3.0,
            min_agreement: 2,
            probability_floor: 0.05,
            probability_ceiling: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSignal {
    pub direction: Direction,
    /// Probability the price moves in the bullish direction.
    pub p_raw: f64,
    /// Weighted sum of signed magnitudes, in [-1, 1].
    pub net_score: f64,
    pub agreement: usize,
    /// Timeframes that contributed a valid score.
    pub available: usize,
    /// Renormalized weight per contributing timeframe.
    pub weights: Vec<(Timeframe, f64)>,
    pub reasons: Vec<String>,
}

impl FusedSignal {
    pub fn is_neutral(&self) -> bool {
        self.direction == Direction::Neutral
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fuse per-timeframe scores, given in configured timeframe order.
pub fn fuse(scores: &[TimeframeScore], cfg: &FusionConfig) -> FusedSignal {
    let valid: Vec<&TimeframeScore> = scores.iter().filter(|s| s.valid && s.weight > 0.0).collect();
    let total_weight: f64 = valid.iter().map(|s| s.weight).sum();

    let weights: Vec<(Timeframe, f64)> = if total_weight > 0.0 {
        valid.iter().map(|s| (s.timeframe, s.weight / total_weight)).collect()
    } else {
        Vec::new()
    };

    let net_score: f64 = valid
        .iter()
        .zip(&weights)
        .map(|(s, (_, w))| w * s.signed())
        .sum::<f64>()
        .clamp(-1.0, 1.0);

    let dominant = Direction::from_sign(net_score);
    let agreement = if dominant == Direction::Neutral {
        0
    } else {
        valid.iter().filter(|s| s.direction == dominant).count()
    };

    let mut reasons: Vec<String> = Vec::new();
    for score in &valid {
        let mut ordered: Vec<_> = score.reasons.iter().collect();
        ordered.sort_by_key(|r| r.significance);
        reasons.extend(ordered.into_iter().map(|r| format!("[{}] {}", score.timeframe, r.text)));
    }

    let agreed = dominant != Direction::Neutral && agreement >= cfg.min_agreement;
    let (direction, p_raw) = if agreed {
        let p = sigmoid(cfg.steepness * net_score)
            .clamp(cfg.probability_floor, cfg.probability_ceiling);
        (dominant, p)
    } else {
        if dominant != Direction::Neutral {
            reasons.push(format!(
                "Timeframes disagree ({agreement} of {} agree), signal neutralised",
                valid.len()
            ));
        }
        (Direction::Neutral, 0.5)
    };

    debug!(
        available = valid.len(),
        agreement,
        net_score = format!("{net_score:+.3}"),
        p_raw = format!("{p_raw:.3}"),
        direction = %direction,
        "Timeframes fused"
    );

    FusedSignal {
        direction,
        p_raw,
        net_score,
        agreement,
        available: valid.len(),
        weights,
        reasons,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
