//! Settlement-risk gate.
//!
//! Final bettable/not-bettable verdict. Every rule is evaluated and every
//! failure recorded, so a rejected decision says all the reasons it was
//! rejected rather than just the first.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::types::GateFailure;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Minimum absolute distance to strike, in quote currency, per symbol.
    pub min_buffers: HashMap<String, f64>,
    /// Buffer for symbols not listed in `min_buffers`.
    pub default_buffer: f64,
    /// `k`: distance must cover this many horizon standard deviations.
    pub volatility_multiplier: f64,
    pub min_edge: f64,
    /// First minute of the hour at which alerts may go out.
    pub alert_window_start: u32,
    /// Last minute of the hour at which alerts may go out (inclusive).
    pub alert_window_end: u32,
    /// The matched market must close within this many minutes. Keeps the
    /// minute-of-hour window from passing the first hour of longer markets.
    pub max_minutes_to_close: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let min_buffers = [("BTCUSDT", 100.0), ("ETHUSDT", 10.0), ("SOLUSDT", 5.0)]
            .into_iter()
            .map(|(s, b)| (s.to_string(), b))
            .collect();
        Self {
            min_buffers,
            default_buffer: 20.0,
            volatility_multiplier: 1.0,
            min_edge: 0.05,
            alert_window_start: 20,
            alert_window_end: 45,
            max_minutes_to_close: 45,
        }
    }
}

impl RiskConfig {
    pub fn buffer_for(&self, symbol: &str) -> f64 {
        self.min_buffers
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(_, b)| *b)
            .unwrap_or(self.default_buffer)
    }

    /// Whether `minute` lies in the alert window. A window whose start is
    /// after its end wraps past the top of the hour.
    pub fn in_alert_window(&self, minute: u32) -> bool {
        let (start, end) = (self.alert_window_start, self.alert_window_end);
        if start <= end {
            (start..=end).contains(&minute)
        } else {
            minute >= start || minute <= end
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GateInputs<'a> {
    pub symbol: &'a str,
    /// `None` when there is no strike to measure against.
    pub distance_to_strike: Option<f64>,
    pub current_price: f64,
    /// Return standard deviation over the exposure horizon, as a fraction.
    pub volatility: f64,
    pub edge: f64,
    /// Minute of the hour at decision time.
    pub minute: u32,
    /// Minutes from decision time to the matched market's close.
    pub minutes_to_close: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub is_bettable: bool,
    pub failures: Vec<GateFailure>,
}

pub struct SettlementRiskGate {
    config: RiskConfig,
}

impl SettlementRiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn check(&self, inputs: &GateInputs<'_>) -> GateVerdict {
        let cfg = &self.config;
        let mut failures = Vec::new();

        match inputs.distance_to_strike {
            None => failures.push(GateFailure::NoMatchedMarket),
            Some(distance) => {
                let distance = distance.abs();
                let buffer = cfg.buffer_for(inputs.symbol);
                if !(distance >= buffer) {
                    failures.push(GateFailure::BelowMinimumBuffer { distance, buffer });
                }

                let distance_pct = if inputs.current_price > 0.0 {
                    distance / inputs.current_price
                } else {
                    0.0
                };
                let required_pct = cfg.volatility_multiplier * inputs.volatility;
                if !(distance_pct >= required_pct) {
                    failures.push(GateFailure::WithinVolatilityBand {
                        distance_pct,
                        required_pct,
                    });
                }
            }
        }

        if !(inputs.edge >= cfg.min_edge) {
            failures.push(GateFailure::InsufficientEdge {
                edge: inputs.edge,
                min_edge: cfg.min_edge,
            });
        }

        if !cfg.in_alert_window(inputs.minute) {
            failures.push(GateFailure::OutsideAlertWindow {
                minute: inputs.minute,
                start: cfg.alert_window_start,
                end: cfg.alert_window_end,
            });
        }
        if let Some(minutes_to_close) = inputs.minutes_to_close {
            if minutes_to_close > cfg.max_minutes_to_close {
                failures.push(GateFailure::TooFarFromClose {
                    minutes_to_close,
                    max_minutes: cfg.max_minutes_to_close,
                });
            }
        }

        let is_bettable = failures.is_empty();
        debug!(
            symbol = inputs.symbol,
            is_bettable,
            failures = failures.len(),
            "Settlement-risk gate evaluated"
        );
        GateVerdict {
            is_bettable,
            failures,
        }
    }
}

impl Default for SettlementRiskGate {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
