//! Calibration: linear correction of the fused probability.
//!
//! The active [`CalibrationParams`] live behind a [`CalibrationHandle`],
//! which hands out whole `Arc` snapshots. A decision cycle takes one
//! snapshot up front and uses it throughout, so a concurrent reload is
//! observed either entirely or not at all.

pub mod fit;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::types::EngineError;

pub use fit::{
    fit_calibration, one_per_market, CalibrationBucket, CalibrationDiagnosis, CalibrationReport,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// How often the host refits from resolved decisions.
    pub refresh_interval_secs: u64,
    /// How far back resolved decisions are read for a fit.
    pub lookback_days: i64,
    /// Fewer resolved decisions than this keeps the current params.
    pub min_samples: usize,
    /// Fixed-width confidence buckets over [0, 1].
    pub num_buckets: usize,
    /// Params older than this are flagged stale.
    pub max_age_hours: i64,
    pub params_path: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 3_600,
            lookback_days: 14,
            min_samples: 10,
            num_buckets: 10,
            max_age_hours: 48,
            params_path: "calibration_params.json".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

const MIDPOINT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub slope: f64,
    pub intercept: f64,
    /// Predicted vs observed win rate per populated bucket.
    #[serde(default)]
    pub buckets: Vec<CalibrationBucket>,
    #[serde(default)]
    pub sample_size: usize,
    #[serde(default)]
    pub brier_score: Option<f64>,
    /// `None` for cold-start identity params.
    #[serde(default)]
    pub fitted_at: Option<DateTime<Utc>>,
}

impl CalibrationParams {
    /// Cold-start params: slope 1, intercept 0.
    pub fn identity() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
            buckets: Vec::new(),
            sample_size: 0,
            brier_score: None,
            fitted_at: None,
        }
    }

    pub fn is_cold_start(&self) -> bool {
        self.fitted_at.is_none()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.fitted_at {
            None => true,
            Some(at) => now - at > max_age,
        }
    }

    /// Intercept that puts the line through (0.5, 0.5) for `slope`.
    pub fn midpoint_intercept(slope: f64) -> f64 {
        0.5 * (1.0 - slope)
    }

    /// `clamp(slope * p + intercept, 0, 1)`.
    pub fn apply(&self, p_raw: f64) -> f64 {
        (self.slope * p_raw + self.intercept).clamp(0.0, 1.0)
    }

    /// Reject params that would invert or break the probability scale, or
    /// that move a neutral 0.5 off the midpoint.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.slope.is_finite() || !self.intercept.is_finite() {
            return Err(EngineError::Calibration(format!(
                "non-finite params (slope={}, intercept={})",
                self.slope, self.intercept
            )));
        }
        if self.slope <= 0.0 {
            return Err(EngineError::Calibration(format!(
                "slope must be positive, got {}",
                self.slope
            )));
        }
        let midpoint = self.slope * 0.5 + self.intercept;
        if (midpoint - 0.5).abs() > MIDPOINT_TOLERANCE {
            return Err(EngineError::Calibration(format!(
                "params map 0.5 to {midpoint:.4}, expected intercept {:.4} for slope {}",
                Self::midpoint_intercept(self.slope),
                self.slope
            )));
        }
        Ok(())
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self::identity()
    }
}

// ---------------------------------------------------------------------------
// Snapshot handle
// ---------------------------------------------------------------------------

/// Process-wide holder of the active calibration snapshot.
#[derive(Debug, Clone)]
pub struct CalibrationHandle {
    inner: Arc<RwLock<Arc<CalibrationParams>>>,
}

impl CalibrationHandle {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(params))),
        }
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<CalibrationParams> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap in a new snapshot. In-flight cycles keep the one they took.
    pub fn reload(&self, params: CalibrationParams) -> Result<(), EngineError> {
        params.validate()?;
        info!(
            slope = format!("{:.4}", params.slope),
            intercept = format!("{:.4}", params.intercept),
            samples = params.sample_size,
            "Calibration reloaded"
        );
        let next = Arc::new(params);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }
}

impl Default for CalibrationHandle {
    fn default() -> Self {
        Self::new(CalibrationParams::identity())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
