//! Historical backtesting.
//!
//! Steps a replay cursor across a window, runs the real decision engine at
//! every step and settles each directional decision against the recorded
//! price at resolution. Reports hit rate, Brier score, unit-stake P&L and
//! a Sharpe ratio over the bets a live run would have placed: the first
//! bettable decision on each market.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::replay::ReplayFeed;
use crate::calibration::fit::{brier_score, CalibrationPoint};
use crate::calibration::CalibrationHandle;
use crate::engine::{DecisionEngine, EngineSettings};
use crate::types::{BetSignal, DecisionRecord};

// ---------------------------------------------------------------------------
// Backtest results
// ---------------------------------------------------------------------------

/// One bet the replay would have placed.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestTrade {
    pub market_id: String,
    pub signal: BetSignal,
    pub decided_at: DateTime<Utc>,
    /// Win probability of the side taken.
    pub probability: f64,
    /// Price paid per unit of payout.
    pub price: f64,
    pub edge: f64,
    pub won: bool,
    /// Profit on a one-unit stake.
    pub pnl: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub cycles: usize,
    pub failed_cycles: usize,
    /// Directional decisions settled against the recording.
    pub resolved: usize,
    pub correct: usize,
    pub hit_rate: f64,
    /// Calibrated P(YES) against the YES outcome, over resolved decisions.
    pub brier_score: f64,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub sharpe_ratio: f64,
    pub trade_log: Vec<BacktestTrade>,
    /// Settled `(decision, won)` pairs, ready for a calibration fit.
    pub resolved_decisions: Vec<(DecisionRecord, bool)>,
}

// ---------------------------------------------------------------------------
// Backtester
// ---------------------------------------------------------------------------

pub struct Backtester {
    replay: Arc<ReplayFeed>,
    engine: DecisionEngine,
    step: Duration,
    price_floor: f64,
}

impl Backtester {
    pub fn new(
        replay: Arc<ReplayFeed>,
        calibration: CalibrationHandle,
        settings: EngineSettings,
        step: Duration,
    ) -> Self {
        let price_floor = settings.edge.price_floor;
        let engine = DecisionEngine::new(replay.clone(), replay.clone(), calibration, settings);
        Self {
            replay,
            engine,
            step: step.max(Duration::minutes(1)),
            price_floor,
        }
    }

    /// Replay `symbol` over `[start, end)`.
    pub async fn run(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> BacktestReport {
        let symbol = symbol.to_uppercase();
        let mut cycles = 0usize;
        let mut failed_cycles = 0usize;
        let mut resolved_decisions = Vec::new();
        let mut points = Vec::new();
        let mut traded: HashSet<String> = HashSet::new();
        let mut trade_log = Vec::new();

        let mut at = start;
        while at < end {
            cycles += 1;
            self.replay.set_cursor(at);
            let record = match self.engine.evaluate_at(&symbol, at).await {
                Ok(record) => record,
                Err(e) => {
                    debug!(symbol = %symbol, at = %at, error = %e, "Replayed cycle failed");
                    failed_cycles += 1;
                    at += self.step;
                    continue;
                }
            };

            if let Some(won) = self.settle(&symbol, &record, at) {
                points.push(CalibrationPoint {
                    predicted: record.p_yes,
                    yes_won: (record.signal == BetSignal::Yes) == won,
                });

                if let Some(market_id) = record.matched_market_id.as_deref() {
                    if record.is_bettable && traded.insert(market_id.to_string()) {
                        trade_log.push(self.trade(market_id, &record, won));
                    }
                }
                resolved_decisions.push((record, won));
            }
            at += self.step;
        }

        let resolved = points.len();
        let correct = resolved_decisions.iter().filter(|(_, won)| *won).count();
        let wins = trade_log.iter().filter(|t| t.won).count();
        let total_trades = trade_log.len();
        let returns: Vec<f64> = trade_log.iter().map(|t| t.pnl).collect();

        let report = BacktestReport {
            symbol,
            start,
            end,
            cycles,
            failed_cycles,
            resolved,
            correct,
            hit_rate: ratio(correct, resolved),
            brier_score: brier_score(&points),
            total_trades,
            wins,
            losses: total_trades - wins,
            win_rate: ratio(wins, total_trades),
            total_pnl: returns.iter().sum(),
            sharpe_ratio: compute_sharpe(&returns),
            trade_log,
            resolved_decisions,
        };
        info!(
            symbol = %report.symbol,
            cycles = report.cycles,
            failed = report.failed_cycles,
            resolved = report.resolved,
            hit_rate = format!("{:.1}%", report.hit_rate * 100.0),
            brier = format!("{:.4}", report.brier_score),
            trades = report.total_trades,
            win_rate = format!("{:.1}%", report.win_rate * 100.0),
            pnl = format!("{:+.3}", report.total_pnl),
            "Backtest complete"
        );
        report
    }

    /// Whether a YES/NO decision on a binary market won. `None` otherwise.
    fn settle(&self, symbol: &str, record: &DecisionRecord, at: DateTime<Utc>) -> Option<bool> {
        if !matches!(record.signal, BetSignal::Yes | BetSignal::No) {
            return None;
        }
        let market_id = record.matched_market_id.as_deref()?;
        let markets = self.replay.markets_at(symbol, at).ok()?;
        let market = markets.iter().find(|m| m.market_id == market_id)?;
        let winner = self.replay.settle(market)?;
        Some(record.signal == winner)
    }

    fn trade(&self, market_id: &str, record: &DecisionRecord, won: bool) -> BacktestTrade {
        let probability = record.win_probability();
        let floor = self.price_floor;
        let price = (probability - record.edge).clamp(floor, 1.0 - floor);
        BacktestTrade {
            market_id: market_id.to_string(),
            signal: record.signal,
            decided_at: record.timestamp,
            probability,
            price,
            edge: record.edge,
            won,
            pnl: if won { (1.0 - price) / price } else { -1.0 },
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64
    } else {
        0.0
    }
}

/// Annualized Sharpe ratio from per-trade returns, assuming hourly markets.
fn compute_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    if std_dev < 1e-10 {
        return 0.0;
    }

    (mean / std_dev) * (365.0_f64 * 24.0).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
