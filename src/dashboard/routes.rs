//! Status API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::calibration::{CalibrationHandle, CalibrationParams};
use crate::engine::{SweepReport, SymbolFailure};
use crate::types::DecisionRecord;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    /// Latest record per symbol.
    pub latest: RwLock<BTreeMap<String, DecisionRecord>>,
    pub last_sweep: RwLock<Option<SweepSummary>>,
    pub calibration: CalibrationHandle,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(calibration: CalibrationHandle) -> Self {
        Self {
            latest: RwLock::new(BTreeMap::new()),
            last_sweep: RwLock::new(None),
            calibration,
            started_at: Utc::now(),
        }
    }

    /// Publish a finished sweep.
    pub async fn record_sweep(&self, report: &SweepReport) {
        {
            let mut latest = self.latest.write().await;
            for record in &report.records {
                latest.insert(record.symbol.clone(), record.clone());
            }
        }
        *self.last_sweep.write().await = Some(SweepSummary::from(report));
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub evaluated: usize,
    pub decided: usize,
    pub bettable: Vec<String>,
    pub failures: Vec<SymbolFailure>,
}

impl From<&SweepReport> for SweepSummary {
    fn from(report: &SweepReport) -> Self {
        Self {
            started_at: report.started_at,
            finished_at: report.finished_at,
            evaluated: report.symbols_evaluated(),
            decided: report.records.len(),
            bettable: report.bettable().iter().map(|r| r.symbol.clone()).collect(),
            failures: report.failures.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type AppState = Arc<DashboardState>;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/decisions
pub async fn get_decisions(State(state): State<AppState>) -> Json<Vec<DecisionRecord>> {
    let latest = state.latest.read().await;
    Json(latest.values().cloned().collect())
}

/// GET /api/decisions/:symbol
pub async fn get_decision(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<DecisionRecord>, ApiError> {
    let latest = state.latest.read().await;
    latest
        .get(&symbol.to_uppercase())
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("No decision for {symbol}")))
}

/// GET /api/calibration
pub async fn get_calibration(State(state): State<AppState>) -> Json<CalibrationParams> {
    Json((*state.calibration.snapshot()).clone())
}

/// PUT /api/calibration
pub async fn put_calibration(
    State(state): State<AppState>,
    Json(params): Json<CalibrationParams>,
) -> Result<Json<CalibrationParams>, ApiError> {
    state
        .calibration
        .reload(params)
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    Ok(Json((*state.calibration.snapshot()).clone()))
}

/// GET /api/sweep
pub async fn get_sweep(State(state): State<AppState>) -> Result<Json<SweepSummary>, ApiError> {
    state
        .last_sweep
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No sweep has run yet"))
}
