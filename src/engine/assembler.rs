//! Decision assembly.
//!
//! Folds the outputs of one evaluation cycle into the immutable record that
//! leaves the engine. Pure: no I/O and no clock reads.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::signal::FusedSignal;
use crate::strategy::edge::EdgeEvaluation;
use crate::strategy::risk::GateVerdict;
use crate::types::{ActiveMarket, DecisionFlag, DecisionRecord, GateFailure, MarketKind};

/// Everything one cycle produced for a symbol.
#[derive(Debug, Clone)]
pub struct DecisionInputs<'a> {
    pub symbol: &'a str,
    pub fused: &'a FusedSignal,
    /// Calibrated P(YES) the evaluation was run on.
    pub p_yes: f64,
    pub evaluation: &'a EdgeEvaluation,
    pub verdict: &'a GateVerdict,
    pub market: Option<&'a ActiveMarket>,
    pub current_price: f64,
    /// Horizon volatility the gate was checked against.
    pub volatility: f64,
    pub calibration_stale: bool,
    pub timestamp: DateTime<Utc>,
}

pub fn assemble(inputs: DecisionInputs<'_>) -> DecisionRecord {
    let DecisionInputs {
        symbol,
        fused,
        p_yes,
        evaluation,
        verdict,
        market,
        current_price,
        volatility,
        calibration_stale,
        timestamp,
    } = inputs;

    let mut flags = Vec::new();
    if calibration_stale {
        flags.push(DecisionFlag::StaleCalibration);
    }
    if market.is_none() {
        flags.push(DecisionFlag::NoMatchedMarket);
    } else if evaluation.neutral_prior {
        flags.push(DecisionFlag::NeutralOddsPrior);
    }

    let mut gate_failures: Vec<GateFailure> = Vec::with_capacity(verdict.failures.len() + 1);
    if market.is_none() {
        gate_failures.push(GateFailure::NoMatchedMarket);
    }
    for failure in &verdict.failures {
        if !gate_failures.contains(failure) {
            gate_failures.push(failure.clone());
        }
    }

    DecisionRecord {
        decision_id: Uuid::new_v4(),
        symbol: symbol.to_uppercase(),
        signal: evaluation.signal,
        backup_signal: evaluation.backup_signal,
        p_raw: fused.p_raw,
        p_yes,
        band_probability: matches!(market.map(|m| &m.kind), Some(MarketKind::Interval { .. }))
            .then_some(evaluation.probability),
        edge: evaluation.edge,
        ev: evaluation.ev,
        is_bettable: verdict.is_bettable && market.is_some() && gate_failures.is_empty(),
        gate_failures,
        distance_to_strike: market.and(evaluation.distance_to_strike),
        volatility,
        current_price,
        predicted_price: evaluation
            .predicted_price
            .is_finite()
            .then_some(evaluation.predicted_price),
        agreement: fused.agreement,
        reasons: fused.reasons.clone(),
        matched_market_id: market.map(|m| m.market_id.clone()),
        market_kind: market.map(|m| m.kind.label().to_string()),
        resolve_at: market.map(|m| m.resolve_at),
        flags,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BetSignal, Direction, MarketStatus, Timeframe};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn make_fused() -> FusedSignal {
        FusedSignal {
            direction: Direction::Bullish,
            p_raw: 0.867,
            net_score: 0.625,
            agreement: 3,
            available: 3,
            weights: vec![(Timeframe::Min5, 0.4), (Timeframe::Min15, 0.35), (Timeframe::Hour1, 0.25)],
            reasons: vec!["[5m] MACD histogram positive".into()],
        }
    }

    fn make_evaluation(neutral_prior: bool) -> EdgeEvaluation {
        EdgeEvaluation {
            signal: BetSignal::Yes,
            backup_signal: None,
            probability: 0.867,
            implied_probability: 0.55,
            edge: 0.317,
            ev: 0.576,
            predicted_price: 69_500.0,
            distance_to_strike: Some(-2_560.0),
            neutral_prior,
        }
    }

    fn make_market(now: DateTime<Utc>) -> ActiveMarket {
        ActiveMarket {
            market_id: "BTC-15".into(),
            symbol: "BTCUSDT".into(),
            question: "Will BTC be above $66,000?".into(),
            kind: MarketKind::Binary { strike_price: dec!(66000) },
            open_at: now - Duration::minutes(25),
            close_at: now + Duration::minutes(20),
            resolve_at: now + Duration::minutes(30),
            status: MarketStatus::Open,
        }
    }

    fn make_inputs<'a>(
        fused: &'a FusedSignal,
        evaluation: &'a EdgeEvaluation,
        verdict: &'a GateVerdict,
        market: Option<&'a ActiveMarket>,
        now: DateTime<Utc>,
    ) -> DecisionInputs<'a> {
        DecisionInputs {
            symbol: "btcusdt",
            fused,
            p_yes: fused.p_raw,
            evaluation,
            verdict,
            market,
            current_price: 68_560.0,
            volatility: 0.0162,
            calibration_stale: false,
            timestamp: now,
        }
    }

    #[test]
    fn test_bettable_record() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        let (fused, eval, market) = (make_fused(), make_evaluation(false), make_market(now));
        let verdict = GateVerdict {
            is_bettable: true,
            failures: vec![],
        };
        let record = assemble(make_inputs(&fused, &eval, &verdict, Some(&market), now));
        assert!(record.is_bettable);
        assert_eq!(record.symbol, "BTCUSDT");
        assert_eq!(record.matched_market_id.as_deref(), Some("BTC-15"));
        assert_eq!(record.market_kind.as_deref(), Some("binary"));
        assert_eq!(record.resolve_at, Some(market.resolve_at));
        assert_eq!(record.p_raw, 0.867);
        assert_eq!(record.p_yes, 0.867);
        assert_eq!(record.band_probability, None);
        assert!(record.flags.is_empty());
        assert_eq!(record.reasons, fused.reasons);
    }

    #[test]
    fn test_no_market_is_never_bettable() {
        let now = Utc::now();
        let (fused, eval) = (make_fused(), make_evaluation(true));
        let verdict = GateVerdict {
            is_bettable: false,
            failures: vec![GateFailure::NoMatchedMarket],
        };
        let record = assemble(make_inputs(&fused, &eval, &verdict, None, now));
        assert!(!record.is_bettable);
        assert_eq!(record.gate_failures, vec![GateFailure::NoMatchedMarket]);
        assert!(record.has_flag(DecisionFlag::NoMatchedMarket));
        assert!(!record.has_flag(DecisionFlag::NeutralOddsPrior));
        assert_eq!(record.distance_to_strike, None);
        assert_eq!(record.matched_market_id, None);
    }

    #[test]
    fn test_flags_for_neutral_prior_and_stale_calibration() {
        let now = Utc::now();
        let (fused, eval, market) = (make_fused(), make_evaluation(true), make_market(now));
        let verdict = GateVerdict {
            is_bettable: true,
            failures: vec![],
        };
        let mut inputs = make_inputs(&fused, &eval, &verdict, Some(&market), now);
        inputs.calibration_stale = true;
        let record = assemble(inputs);
        assert!(record.has_flag(DecisionFlag::StaleCalibration));
        assert!(record.has_flag(DecisionFlag::NeutralOddsPrior));
        // Flags never veto on their own
        assert!(record.is_bettable);
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let (fused, eval) = (make_fused(), make_evaluation(false));
        let verdict = GateVerdict {
            is_bettable: false,
            failures: vec![],
        };
        let a = assemble(make_inputs(&fused, &eval, &verdict, None, now));
        let b = assemble(make_inputs(&fused, &eval, &verdict, None, now));
        assert_ne!(a.decision_id, b.decision_id);
    }

    #[test]
    fn test_interval_record_keeps_calibrated_p_yes() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        let fused = make_fused();
        let eval = EdgeEvaluation {
            signal: BetSignal::High,
            backup_signal: Some(BetSignal::Mid),
            probability: 0.563,
            implied_probability: 0.3,
            edge: 0.263,
            ..make_evaluation(false)
        };
        let market = ActiveMarket {
            kind: MarketKind::Interval {
                lower: dec!(67500),
                upper: dec!(68500),
            },
            ..make_market(now)
        };
        let verdict = GateVerdict {
            is_bettable: true,
            failures: vec![],
        };
        let record = assemble(make_inputs(&fused, &eval, &verdict, Some(&market), now));
        assert_eq!(record.p_yes, 0.867);
        assert_eq!(record.band_probability, Some(0.563));
        assert_eq!(record.market_kind.as_deref(), Some("interval"));
        assert!((record.win_probability() - 0.563).abs() < 1e-12);
    }
}
