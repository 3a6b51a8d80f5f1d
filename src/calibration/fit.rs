//! Calibration fitting from resolved decisions.
//!
//! Batch job, run on the host's refresh schedule rather than per decision.
//! Works in the same space the params are applied in: the raw fused
//! probability of YES against whether YES actually resolved. Buckets those
//! pairs, then fits a line through the bucket means that is pinned at
//! (0.5, 0.5), so a fitted snapshot can damp or sharpen a lean but never
//! flip its direction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{CalibrationConfig, CalibrationParams};
use crate::types::{BetSignal, DecisionRecord};

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// A single prediction–outcome pair in YES space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    /// Raw fused probability of YES.
    pub predicted: f64,
    /// Whether the market resolved YES.
    pub yes_won: bool,
}

impl CalibrationPoint {
    /// `None` for HOLD, interval bands and anything without a finite raw
    /// probability. Only binary YES/NO decisions say something about P(YES).
    pub fn from_resolved(record: &DecisionRecord, won: bool) -> Option<Self> {
        if !record.p_raw.is_finite() || record.market_kind.as_deref() == Some("interval") {
            return None;
        }
        let yes_won = match record.signal {
            BetSignal::Yes => won,
            BetSignal::No => !won,
            _ => return None,
        };
        Some(Self {
            predicted: record.p_raw,
            yes_won,
        })
    }
}

/// Keep one decision per `(symbol, market)`: the latest bettable one, or
/// the latest overall when none was bettable. Sweeps re-decide the same
/// market every cycle, and those records share a single outcome.
pub fn one_per_market(resolved: &[(DecisionRecord, bool)]) -> Vec<&(DecisionRecord, bool)> {
    let mut chosen: HashMap<(&str, &str), &(DecisionRecord, bool)> = HashMap::new();
    for entry in resolved {
        let record = &entry.0;
        let Some(market_id) = record.matched_market_id.as_deref() else {
            continue;
        };
        let key = (record.symbol.as_str(), market_id);
        let replace = match chosen.get(&key) {
            None => true,
            Some((current, _)) => {
                (record.is_bettable, record.timestamp) > (current.is_bettable, current.timestamp)
            }
        };
        if replace {
            chosen.insert(key, entry);
        }
    }
    let mut kept: Vec<_> = chosen.into_values().collect();
    kept.sort_by_key(|(record, _)| record.timestamp);
    kept
}

/// A bucket in the calibration curve (e.g., all predictions between 0.60-0.70).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub predicted_rate: f64,
    /// Fraction of the bucket that resolved YES.
    pub observed_rate: f64,
    pub count: usize,
}

impl CalibrationBucket {
    pub fn deviation(&self) -> f64 {
        (self.predicted_rate - self.observed_rate).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    /// Leans came true less often than predicted.
    OverConfident,
    /// Leans came true more often than predicted.
    UnderConfident,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub total_predictions: usize,
    pub brier_score: f64,
    /// Populated buckets only.
    pub buckets: Vec<CalibrationBucket>,
    pub diagnosis: CalibrationDiagnosis,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Brier = (1/N) * Σ(predicted - outcome)². 0.0 is perfect, 0.25 is a coin flip.
pub fn brier_score(points: &[CalibrationPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .iter()
        .map(|p| {
            let outcome = if p.yes_won { 1.0 } else { 0.0 };
            (p.predicted - outcome).powi(2)
        })
        .sum();
    sum / points.len() as f64
}

/// Group points into `num_buckets` equal-width bins over [0, 1].
pub fn bucketize(points: &[CalibrationPoint], num_buckets: usize) -> Vec<CalibrationBucket> {
    let n = num_buckets.max(1);
    let width = 1.0 / n as f64;
    let mut sums = vec![(0.0_f64, 0_usize, 0_usize); n];

    for p in points {
        let idx = ((p.predicted.clamp(0.0, 1.0) * n as f64).floor() as usize).min(n - 1);
        let slot = &mut sums[idx];
        slot.0 += p.predicted;
        slot.1 += usize::from(p.yes_won);
        slot.2 += 1;
    }

    sums.into_iter()
        .enumerate()
        .filter(|(_, (_, _, count))| *count > 0)
        .map(|(i, (predicted_sum, wins, count))| CalibrationBucket {
            bin_start: i as f64 * width,
            bin_end: (i + 1) as f64 * width,
            predicted_rate: predicted_sum / count as f64,
            observed_rate: wins as f64 / count as f64,
            count,
        })
        .collect()
}

fn diagnose(buckets: &[CalibrationBucket], total: usize, min_samples: usize) -> CalibrationDiagnosis {
    if total < min_samples || buckets.is_empty() {
        return CalibrationDiagnosis::InsufficientData;
    }
    // Count-weighted (predicted - observed), signed toward each bucket's lean
    let gap = buckets
        .iter()
        .map(|b| {
            let lean = (b.predicted_rate - 0.5).signum();
            lean * (b.predicted_rate - b.observed_rate) * b.count as f64
        })
        .sum::<f64>()
        / total as f64;

    if gap > 0.05 {
        CalibrationDiagnosis::OverConfident
    } else if gap < -0.05 {
        CalibrationDiagnosis::UnderConfident
    } else {
        CalibrationDiagnosis::WellCalibrated
    }
}

pub fn report(points: &[CalibrationPoint], cfg: &CalibrationConfig) -> CalibrationReport {
    let buckets = bucketize(points, cfg.num_buckets);
    let diagnosis = diagnose(&buckets, points.len(), cfg.min_samples);
    CalibrationReport {
        total_predictions: points.len(),
        brier_score: brier_score(points),
        buckets,
        diagnosis,
    }
}

// ---------------------------------------------------------------------------
// Fit
// ---------------------------------------------------------------------------

/// Weighted least-squares slope of a line forced through (0.5, 0.5).
/// `None` when no point sits off the midpoint.
fn slope_through_midpoint(points: &[(f64, f64, f64)]) -> Option<f64> {
    let sxx: f64 = points.iter().map(|(x, _, w)| w * (x - 0.5).powi(2)).sum();
    let sxy: f64 = points
        .iter()
        .map(|(x, y, w)| w * (x - 0.5) * (y - 0.5))
        .sum();
    if sxx < 1e-12 {
        return None;
    }
    Some(sxy / sxx)
}

/// Fit calibration params from resolved `(decision, won)` pairs.
///
/// Only one decision per market counts toward `min_samples`. Returns
/// `None` when there are too few usable markets or the fit is degenerate;
/// callers keep the current snapshot in that case.
pub fn fit_calibration(
    resolved: &[(DecisionRecord, bool)],
    cfg: &CalibrationConfig,
    now: DateTime<Utc>,
) -> Option<CalibrationParams> {
    let points: Vec<CalibrationPoint> = one_per_market(resolved)
        .into_iter()
        .filter_map(|(record, won)| CalibrationPoint::from_resolved(record, *won))
        .collect();

    if points.len() < cfg.min_samples {
        info!(
            samples = points.len(),
            decisions = resolved.len(),
            required = cfg.min_samples,
            "Not enough resolved markets to fit calibration"
        );
        return None;
    }

    let report = report(&points, cfg);

    let xs: Vec<(f64, f64, f64)> = report
        .buckets
        .iter()
        .map(|b| (b.predicted_rate, b.observed_rate, b.count as f64))
        .collect();

    let Some(slope) = slope_through_midpoint(&xs) else {
        warn!(buckets = report.buckets.len(), "Degenerate calibration fit, keeping current params");
        return None;
    };
    if !slope.is_finite() || slope <= 0.0 {
        warn!(slope, "Calibration fit rejected");
        return None;
    }
    let intercept = CalibrationParams::midpoint_intercept(slope);

    for b in &report.buckets {
        debug!(
            bucket = format!("{:.0}-{:.0}%", b.bin_start * 100.0, b.bin_end * 100.0),
            predicted = format!("{:.3}", b.predicted_rate),
            observed = format!("{:.3}", b.observed_rate),
            count = b.count,
            "Calibration bucket"
        );
    }
    info!(
        samples = report.total_predictions,
        slope = format!("{slope:.4}"),
        intercept = format!("{intercept:.4}"),
        brier = format!("{:.4}", report.brier_score),
        diagnosis = ?report.diagnosis,
        "Calibration fitted"
    );

    Some(CalibrationParams {
        slope,
        intercept,
        buckets: report.buckets,
        sample_size: report.total_predictions,
        brier_score: Some(report.brier_score),
        fitted_at: Some(now),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
