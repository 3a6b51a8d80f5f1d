//! EV/edge evaluation.
//!
//! Compares the calibrated probability with the market-implied probability
//! of the recommended outcome. Binary markets recommend YES or NO; interval
//! markets project a price forecast over the remaining horizon and pick the
//! most likely of LOW/MID/HIGH, keeping the runner-up as a backup.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{BetSignal, MarketKind, MarketOdds};

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Implied YES probability assumed when a binary market has no odds.
    pub binary_neutral_prior: f64,
    /// Implied band probability assumed when an interval market has no odds.
    pub interval_neutral_prior: f64,
    /// Market prices are clamped into [floor, 1 - floor] before computing payouts.
    pub price_floor: f64,
    /// Expected move, in horizon standard deviations, at full conviction.
    pub forecast_sigma_multiple: f64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            binary_neutral_prior: 0.5,
            interval_neutral_prior: 1.0 / 3.0,
            price_floor: 0.01,
            forecast_sigma_multiple: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeEvaluation {
    pub signal: BetSignal,
    pub backup_signal: Option<BetSignal>,
    /// P(YES) for binary markets, P(chosen band) for interval markets.
    pub probability: f64,
    /// Market-implied probability of the recommended outcome.
    pub implied_probability: f64,
    pub edge: f64,
    pub ev: f64,
    pub predicted_price: f64,
    /// Strike (or nearest band boundary) minus current price.
    pub distance_to_strike: Option<f64>,
    /// Odds were missing and a neutral prior stood in.
    pub neutral_prior: bool,
}

/// Expected profit per unit staked on an outcome with win probability `p`
/// bought at `price`: win `(1 - price) / price`, lose the stake.
pub fn unit_ev(p: f64, price: f64) -> f64 {
    let payout_if_win = (1.0 - price) / price;
    p * payout_if_win - (1.0 - p)
}

/// Standard normal CDF (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
pub fn normal_cdf(x: f64) -> f64 {
    let z = x / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * z.abs());
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-z * z).exp();
    let erf = if z >= 0.0 { erf } else { -erf };
    0.5 * (1.0 + erf)
}

pub struct EdgeEvaluator {
    config: EdgeConfig,
}

impl EdgeEvaluator {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Evaluate a calibrated probability against a market.
    ///
    /// `horizon_volatility` is the return standard deviation over the time
    /// left until resolution. Without a market (`kind == None`) the result
    /// is a binary evaluation against the neutral prior with no distance.
    pub fn evaluate(
        &self,
        p_calibrated: f64,
        kind: Option<&MarketKind>,
        odds: Option<&MarketOdds>,
        current_price: f64,
        horizon_volatility: f64,
    ) -> EdgeEvaluation {
        let predicted_price = self.forecast(p_calibrated, current_price, horizon_volatility);

        let evaluation = match kind {
            Some(MarketKind::Interval { lower, upper }) => {
                let lower = lower.to_f64().unwrap_or(f64::NAN);
                let upper = upper.to_f64().unwrap_or(f64::NAN);
                self.evaluate_interval(
                    lower,
                    upper,
                    odds,
                    current_price,
                    predicted_price,
                    horizon_volatility,
                )
            }
            Some(MarketKind::Binary { strike_price }) => {
                let distance = strike_price.to_f64().map(|s| s - current_price);
                self.evaluate_binary(p_calibrated, odds, predicted_price, distance)
            }
            None => self.evaluate_binary(p_calibrated, None, predicted_price, None),
        };

        debug!(
            signal = %evaluation.signal,
            probability = format!("{:.3}", evaluation.probability),
            implied = format!("{:.3}", evaluation.implied_probability),
            edge = format!("{:+.1}%", evaluation.edge * 100.0),
            ev = format!("{:+.3}", evaluation.ev),
            neutral_prior = evaluation.neutral_prior,
            "Edge evaluated"
        );
        evaluation
    }

    /// Point forecast: current price moved by the calibrated conviction,
    /// `2p - 1`, times the horizon volatility.
    fn forecast(&self, p: f64, current_price: f64, horizon_volatility: f64) -> f64 {
        let conviction = (2.0 * p - 1.0).clamp(-1.0, 1.0);
        current_price * (1.0 + conviction * horizon_volatility * self.config.forecast_sigma_multiple)
    }

    fn clamp_price(&self, price: f64) -> f64 {
        let floor = self.config.price_floor;
        price.clamp(floor, 1.0 - floor)
    }

    fn evaluate_binary(
        &self,
        p: f64,
        odds: Option<&MarketOdds>,
        predicted_price: f64,
        distance_to_strike: Option<f64>,
    ) -> EdgeEvaluation {
        let (yes_price, no_price, neutral_prior) = match odds {
            Some(MarketOdds::Binary { yes_price, no_price }) => (*yes_price, *no_price, false),
            _ => {
                let prior = self.config.binary_neutral_prior;
                (prior, 1.0 - prior, true)
            }
        };

        let (signal, implied, edge, ev) = if p > 0.5 {
            (BetSignal::Yes, yes_price, p - yes_price, unit_ev(p, self.clamp_price(yes_price)))
        } else if p < 0.5 {
            let p_no = 1.0 - p;
            (BetSignal::No, no_price, p_no - no_price, unit_ev(p_no, self.clamp_price(no_price)))
        } else {
            (BetSignal::Hold, yes_price, 0.0, 0.0)
        };

        EdgeEvaluation {
            signal,
            backup_signal: None,
            probability: p,
            implied_probability: implied,
            edge,
            ev,
            predicted_price,
            distance_to_strike,
            neutral_prior,
        }
    }

    fn evaluate_interval(
        &self,
        lower: f64,
        upper: f64,
        odds: Option<&MarketOdds>,
        current_price: f64,
        predicted_price: f64,
        horizon_volatility: f64,
    ) -> EdgeEvaluation {
        let bands = band_probabilities(lower, upper, predicted_price, current_price * horizon_volatility);

        let mut ranked = bands;
        // Stable: ties keep LOW, MID, HIGH order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let (signal, probability) = ranked[0];
        let backup_signal = Some(ranked[1].0);

        let (implied, neutral_prior) = match odds.and_then(|o| o.implied(signal)) {
            Some(implied) => (implied, false),
            None => (self.config.interval_neutral_prior, true),
        };

        let nearest = if (lower - current_price).abs() <= (upper - current_price).abs() {
            lower
        } else {
            upper
        };

        EdgeEvaluation {
            signal,
            backup_signal,
            probability,
            implied_probability: implied,
            edge: probability - implied,
            ev: unit_ev(probability, self.clamp_price(implied)),
            predicted_price,
            distance_to_strike: Some(nearest - current_price),
            neutral_prior,
        }
    }
}

impl Default for EdgeEvaluator {
    fn default() -> Self {
        Self::new(EdgeConfig::default())
    }
}

/// Probability mass below `lower`, inside `[lower, upper]` and above `upper`
/// for a normal price distribution centered at `mean` with `std_dev`.
/// A zero spread puts all mass on the band containing `mean`.
fn band_probabilities(lower: f64, upper: f64, mean: f64, std_dev: f64) -> [(BetSignal, f64); 3] {
    let (low, high) = if std_dev > 0.0 && std_dev.is_finite() {
        (
            normal_cdf((lower - mean) / std_dev),
            1.0 - normal_cdf((upper - mean) / std_dev),
        )
    } else if mean < lower {
        (1.0, 0.0)
    } else if mean > upper {
        (0.0, 1.0)
    } else {
        (0.0, 0.0)
    };
    let mid = (1.0 - low - high).max(0.0);
    [
        (BetSignal::Low, low),
        (BetSignal::Mid, mid),
        (BetSignal::High, high),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
