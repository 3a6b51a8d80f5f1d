//! Persistence layer.
//!
//! Calibration params are saved to and restored from a JSON file so a
//! restart keeps the last fit. Decision history and settlements live in
//! the SQLite outcome store (`outcomes`).

pub mod outcomes;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::calibration::CalibrationParams;

pub use outcomes::{OutcomeStore, SqliteOutcomeStore, SymbolPerformance};

/// Default calibration file path.
const DEFAULT_PARAMS_FILE: &str = "calibration_params.json";

/// Save calibration params to a JSON file.
pub fn save_params(params: &CalibrationParams, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_PARAMS_FILE);
    let json = serde_json::to_string_pretty(params)
        .context("Failed to serialise calibration params")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write calibration params to {path}"))?;

    debug!(path, slope = params.slope, intercept = params.intercept, "Calibration saved");
    Ok(())
}

/// Load calibration params from a JSON file.
/// Returns None if the file doesn't exist (cold start).
pub fn load_params(path: Option<&str>) -> Result<Option<CalibrationParams>> {
    let path = path.unwrap_or(DEFAULT_PARAMS_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved calibration found, using identity");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read calibration params from {path}"))?;

    let params: CalibrationParams = serde_json::from_str(&json)
        .context(format!("Failed to parse calibration params from {path}"))?;

    info!(
        path,
        slope = params.slope,
        intercept = params.intercept,
        samples = params.sample_size,
        fitted_at = ?params.fitted_at,
        "Calibration loaded from disk"
    );

    Ok(Some(params))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
