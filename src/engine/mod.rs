//! Decision engine: the per-symbol evaluate cycle and the parallel sweep.
//!
//! One cycle reads candles and a spot price from the data source, scores
//! every configured timeframe, fuses the scores, calibrates, matches a
//! listed market, prices the edge, runs the settlement-risk gate and
//! assembles a `DecisionRecord`. Cycles share nothing mutable except the
//! calibration snapshot, which each cycle reads exactly once.

pub mod assembler;
pub mod matcher;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationHandle, CalibrationParams};
use crate::config::{AppConfig, TimeframeSetting};
use crate::data::MarketDataSource;
use crate::platforms::MarketCatalog;
use crate::signal::indicators::{self, DEFAULT_BAR_VOLATILITY};
use crate::signal::{fuse, FusionConfig, IndicatorConfig, ScoringConfig, TimeframeScore, TimeframeScorer};
use crate::strategy::edge::{EdgeConfig, EdgeEvaluator};
use crate::strategy::risk::{GateInputs, RiskConfig, SettlementRiskGate};
use crate::types::{CandleSeries, DecisionRecord, EngineError};

use assembler::{assemble, DecisionInputs};
use matcher::select_market;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Evaluated in order; the first one that loads is the volatility base.
    pub timeframes: Vec<TimeframeSetting>,
    pub indicators: IndicatorConfig,
    pub scoring: ScoringConfig,
    pub fusion: FusionConfig,
    pub edge: EdgeConfig,
    pub risk: RiskConfig,
    /// Returns used for trailing volatility on the base timeframe.
    pub volatility_window: usize,
    /// Exposure horizon when no market is matched.
    pub default_horizon_minutes: i64,
    /// Fewer usable timeframes than this fails the cycle.
    pub min_timeframes: usize,
    pub max_calibration_age_hours: i64,
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            timeframes: cfg.timeframes.clone(),
            indicators: cfg.indicators.clone(),
            scoring: cfg.scoring.clone(),
            fusion: cfg.fusion.clone(),
            edge: cfg.edge.clone(),
            risk: cfg.risk.clone(),
            volatility_window: cfg.engine.volatility_window,
            default_horizon_minutes: cfg.engine.default_horizon_minutes,
            min_timeframes: cfg.engine.min_timeframes,
            max_calibration_age_hours: cfg.calibration.max_age_hours,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeframes: TimeframeSetting::defaults(),
            indicators: IndicatorConfig::default(),
            scoring: ScoringConfig::default(),
            fusion: FusionConfig::default(),
            edge: EdgeConfig::default(),
            risk: RiskConfig::default(),
            volatility_window: 30,
            default_horizon_minutes: 60,
            min_timeframes: 2,
            max_calibration_age_hours: 48,
        }
    }
}

// ---------------------------------------------------------------------------
// Sweep report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<DecisionRecord>,
    pub failures: Vec<SymbolFailure>,
}

impl SweepReport {
    pub fn bettable(&self) -> Vec<&DecisionRecord> {
        self.records.iter().filter(|r| r.is_bettable).collect()
    }

    pub fn symbols_evaluated(&self) -> usize {
        self.records.len() + self.failures.len()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    data: Arc<dyn MarketDataSource>,
    catalog: Arc<dyn MarketCatalog>,
    calibration: CalibrationHandle,
    settings: EngineSettings,
    scorer: TimeframeScorer,
    evaluator: EdgeEvaluator,
    gate: SettlementRiskGate,
}

impl DecisionEngine {
    pub fn new(
        data: Arc<dyn MarketDataSource>,
        catalog: Arc<dyn MarketCatalog>,
        calibration: CalibrationHandle,
        settings: EngineSettings,
    ) -> Self {
        Self {
            scorer: TimeframeScorer::new(settings.scoring.clone()),
            evaluator: EdgeEvaluator::new(settings.edge.clone()),
            gate: SettlementRiskGate::new(settings.risk.clone()),
            data,
            catalog,
            calibration,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Shared handle to the active calibration snapshot.
    pub fn calibration(&self) -> &CalibrationHandle {
        &self.calibration
    }

    /// Atomically swap the calibration snapshot. Cycles already running
    /// finish on the snapshot they started with.
    pub fn reload_calibration(&self, params: CalibrationParams) -> Result<(), EngineError> {
        self.calibration.reload(params)
    }

    /// Run one decision cycle for `symbol` at the current time.
    pub async fn evaluate(&self, symbol: &str) -> Result<DecisionRecord, EngineError> {
        self.evaluate_at(symbol, Utc::now()).await
    }

    /// Run one decision cycle for `symbol` as of `now`.
    pub async fn evaluate_at(&self, symbol: &str, now: DateTime<Utc>) -> Result<DecisionRecord, EngineError> {
        let symbol = symbol.to_uppercase();
        let calibration = self.calibration.snapshot();

        let current_price = self.data.get_current_price(&symbol).await?;
        if !(current_price.is_finite() && current_price > 0.0) {
            return Err(EngineError::no_data(&symbol, format!("unusable spot price {current_price}")));
        }

        // -- Signal -------------------------------------------------------
        let mut scores: Vec<TimeframeScore> = Vec::with_capacity(self.settings.timeframes.len());
        let mut base: Option<CandleSeries> = None;
        let mut last_err = None;
        for setting in &self.settings.timeframes {
            match self.score_timeframe(&symbol, setting).await {
                Ok((score, series)) => {
                    scores.push(score);
                    base.get_or_insert(series);
                }
                Err(e) => {
                    warn!(symbol = %symbol, timeframe = %setting.timeframe, error = %e, "Timeframe skipped");
                    last_err = Some(e);
                }
            }
        }
        let required = self.settings.min_timeframes.max(1);
        let base = match base {
            Some(series) if scores.len() >= required => series,
            _ => {
                return Err(last_err.unwrap_or_else(|| {
                    EngineError::no_data(&symbol, format!("need {required} timeframes, have {}", scores.len()))
                }))
            }
        };

        let fused = fuse(&scores, &self.settings.fusion);

        // -- Calibration ----------------------------------------------------
        let max_age = Duration::hours(self.settings.max_calibration_age_hours);
        let calibration_stale = calibration.is_stale(now, max_age);
        let p_calibrated = if calibration_stale {
            CalibrationParams::identity().apply(fused.p_raw)
        } else {
            calibration.apply(fused.p_raw)
        };

        // -- Market -----------------------------------------------------------
        let markets = self.catalog.list_active_markets(&symbol).await?;
        let market = select_market(&symbol, now, &markets);
        let odds = match market {
            Some(m) => match self.catalog.market_odds(m).await {
                Ok(odds) => odds,
                Err(e) => {
                    warn!(symbol = %symbol, market_id = %m.market_id, error = %e, "Odds unavailable, using neutral prior");
                    None
                }
            },
            None => None,
        };

        // -- Edge and gate ----------------------------------------------------
        let volatility = self.horizon_volatility(&base, market.map(|m| m.resolve_at), now);
        let evaluation = self.evaluator.evaluate(
            p_calibrated,
            market.map(|m| &m.kind),
            odds.as_ref(),
            current_price,
            volatility,
        );
        let verdict = self.gate.check(&GateInputs {
            symbol: &symbol,
            distance_to_strike: market.and(evaluation.distance_to_strike),
            current_price,
            volatility,
            edge: evaluation.edge,
            minute: now.minute(),
            minutes_to_close: market.map(|m| (m.close_at - now).num_minutes()),
        });

        let record = assemble(DecisionInputs {
            symbol: &symbol,
            fused: &fused,
            p_yes: p_calibrated,
            evaluation: &evaluation,
            verdict: &verdict,
            market,
            current_price,
            volatility,
            calibration_stale,
            timestamp: now,
        });

        info!(
            symbol = %record.symbol,
            signal = %record.signal,
            p_raw = format!("{:.3}", record.p_raw),
            p = format!("{:.3}", record.p_yes),
            edge = format!("{:+.1}%", record.edge * 100.0),
            agreement = record.agreement,
            market = record.matched_market_id.as_deref().unwrap_or("-"),
            is_bettable = record.is_bettable,
            "Decision"
        );
        Ok(record)
    }

    async fn score_timeframe(
        &self,
        symbol: &str,
        setting: &TimeframeSetting,
    ) -> Result<(TimeframeScore, CandleSeries), EngineError> {
        let count = setting.candles.max(self.settings.indicators.min_candles());
        let series = self.data.get_candles(symbol, setting.timeframe, count).await?;
        let set = indicators::compute(&series, &self.settings.indicators)?;
        let score = self.scorer.score(&set, setting.weight);
        debug!(
            symbol,
            timeframe = %setting.timeframe,
            direction = %score.direction,
            magnitude = format!("{:.3}", score.magnitude),
            "Timeframe scored"
        );
        Ok((score, series))
    }

    /// Trailing per-bar volatility of the base series, scaled to the time
    /// left until `resolve_at` (or the default horizon).
    fn horizon_volatility(
        &self,
        base: &CandleSeries,
        resolve_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> f64 {
        let bar = indicators::return_volatility(&base.closes(), self.settings.volatility_window)
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_BAR_VOLATILITY);

        let horizon = resolve_at
            .map(|at| at - now)
            .filter(|d| *d > Duration::zero())
            .unwrap_or_else(|| Duration::minutes(self.settings.default_horizon_minutes));
        let bars = horizon.num_seconds() as f64 / base.timeframe().seconds() as f64;
        bar * bars.max(0.0).sqrt()
    }

    /// Evaluate every symbol concurrently. One symbol failing, or its task
    /// panicking, never affects the others.
    pub async fn sweep(self: &Arc<Self>, symbols: &[String]) -> SweepReport {
        self.run_sweep(symbols, None).await
    }

    /// `sweep` with every cycle pinned to `now`.
    pub async fn sweep_at(self: &Arc<Self>, symbols: &[String], now: DateTime<Utc>) -> SweepReport {
        self.run_sweep(symbols, Some(now)).await
    }

    async fn run_sweep(self: &Arc<Self>, symbols: &[String], now: Option<DateTime<Utc>>) -> SweepReport {
        let started_at = Utc::now();

        let handles: Vec<_> = symbols
            .iter()
            .map(|symbol| {
                let engine = Arc::clone(self);
                let task_symbol = symbol.clone();
                let handle = tokio::spawn(async move {
                    match now {
                        Some(at) => engine.evaluate_at(&task_symbol, at).await,
                        None => engine.evaluate(&task_symbol).await,
                    }
                });
                (symbol.clone(), handle)
            })
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();
        for (symbol, handle) in handles {
            match handle.await {
                Ok(Ok(record)) => records.push(record),
                Ok(Err(e)) => {
                    warn!(symbol = %symbol, error = %e, "Symbol cycle failed");
                    failures.push(SymbolFailure {
                        symbol,
                        error: e.to_string(),
                    });
                }
                Err(join) => {
                    warn!(symbol = %symbol, error = %join, "Symbol task aborted");
                    failures.push(SymbolFailure {
                        symbol,
                        error: format!("task aborted: {join}"),
                    });
                }
            }
        }

        SweepReport {
            started_at,
            finished_at: Utc::now(),
            records,
            failures,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
