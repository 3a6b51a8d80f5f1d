//! Full decision cycles from candles to record: a bettable setup, a
//! strike too close to price, no open market, and calibration refits
//! from settled outcomes feeding the next cycle.

use chrono::Duration;
use rust_decimal_macros::dec;
use std::sync::Arc;

use augur::calibration::{fit_calibration, CalibrationConfig};
use augur::storage::{OutcomeStore, SqliteOutcomeStore};
use augur::types::{
    BetSignal, DecisionFlag, DecisionRecord, EngineError, GateFailure, MarketOdds, Timeframe,
};

use crate::fixtures::{fresh_calibration, make_binary_market, make_engine, make_now, LAST_CLOSE};
use crate::mock_collaborators::{MockCatalog, MockDataSource};

fn binary_odds() -> Option<MarketOdds> {
    MarketOdds::from_binary_volumes(55.0, 45.0)
}

#[tokio::test]
async fn test_bullish_setup_far_from_strike_is_bettable() {
    let data = Arc::new(MockDataSource::new());
    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(66000)),
        binary_odds(),
    ));
    let engine = make_engine(data.clone(), catalog, fresh_calibration());

    let record = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    assert_eq!(record.signal, BetSignal::Yes);
    assert!(record.p_yes > 0.8, "p_yes {}", record.p_yes);
    assert!((record.edge - (record.p_yes - 0.55)).abs() < 1e-9);
    assert!(record.ev > 0.0);
    assert_eq!(record.distance_to_strike, Some(66_000.0 - LAST_CLOSE));
    assert_eq!(record.matched_market_id.as_deref(), Some("BTC-1500"));
    assert_eq!(record.resolve_at, Some(make_now() + Duration::minutes(30)));
    assert!(record.is_bettable, "{:?}", record.gate_failures);
    assert!(record.flags.is_empty());
    assert_eq!(data.candle_calls(), 3);
}

#[tokio::test]
async fn test_bearish_setup_recommends_no() {
    let data = Arc::new(MockDataSource::new());
    data.set_bearish("BTCUSDT");
    data.set_price("BTCUSDT", 91_440.0);
    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(94000)),
        binary_odds(),
    ));
    let engine = make_engine(data, catalog, fresh_calibration());

    let record = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    assert_eq!(record.signal, BetSignal::No);
    assert!(record.p_yes < 0.2, "p_yes {}", record.p_yes);
    assert!((record.edge - ((1.0 - record.p_yes) - 0.45)).abs() < 1e-9);
    assert!(record.is_bettable, "{:?}", record.gate_failures);
}

#[tokio::test]
async fn test_price_on_strike_fails_buffer() {
    let data = Arc::new(MockDataSource::new());
    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(68560)),
        binary_odds(),
    ));
    let engine = make_engine(data, catalog, fresh_calibration());

    let record = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    assert_eq!(record.signal, BetSignal::Yes);
    assert_eq!(record.distance_to_strike, Some(0.0));
    assert!(!record.is_bettable);
    assert!(record
        .gate_failures
        .iter()
        .any(|f| matches!(f, GateFailure::BelowMinimumBuffer { .. })));
    assert!(record
        .gate_failures
        .iter()
        .any(|f| matches!(f, GateFailure::WithinVolatilityBand { .. })));
}

#[tokio::test]
async fn test_no_open_market_is_a_valid_decision() {
    let data = Arc::new(MockDataSource::new());
    let catalog = Arc::new(MockCatalog::new());
    let engine = make_engine(data, catalog, fresh_calibration());

    let record = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    assert!(!record.is_bettable);
    assert_eq!(record.matched_market_id, None);
    assert_eq!(record.distance_to_strike, None);
    assert!(record.has_flag(DecisionFlag::NoMatchedMarket));
    assert_eq!(
        record
            .gate_failures
            .iter()
            .filter(|f| matches!(f, GateFailure::NoMatchedMarket))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_market_without_odds_uses_neutral_prior() {
    let data = Arc::new(MockDataSource::new());
    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(66000)),
        None,
    ));
    let engine = make_engine(data, catalog, fresh_calibration());

    let record = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    assert!(record.has_flag(DecisionFlag::NeutralOddsPrior));
    assert!((record.edge - (record.p_yes - 0.5)).abs() < 1e-9);
}

#[tokio::test]
async fn test_catalog_outage_fails_the_cycle() {
    let data = Arc::new(MockDataSource::new());
    let catalog = Arc::new(MockCatalog::new());
    catalog.set_error("503 Service Unavailable");
    let engine = make_engine(data, catalog, fresh_calibration());

    let err = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap_err();
    assert!(matches!(err, EngineError::Catalog(_)), "{err:?}");
}

#[tokio::test]
async fn test_data_outage_then_recovery() {
    let data = Arc::new(MockDataSource::new());
    let catalog = Arc::new(MockCatalog::new());
    let engine = make_engine(data.clone(), catalog, fresh_calibration());

    data.set_error("connection reset");
    let err = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap_err();
    assert!(matches!(err, EngineError::NoData { .. }), "{err:?}");

    data.clear_error();
    assert!(engine.evaluate_at("BTCUSDT", make_now()).await.is_ok());
}

#[tokio::test]
async fn test_two_missing_timeframes_fail_the_cycle() {
    let data = Arc::new(MockDataSource::new());
    data.drop_timeframe(Timeframe::Min15);
    data.drop_timeframe(Timeframe::Hour1);
    let engine = make_engine(data, Arc::new(MockCatalog::new()), fresh_calibration());

    let err = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap_err();
    assert!(matches!(err, EngineError::NoData { .. }), "{err:?}");
}

fn make_settled_decision(market_id: &str, p_yes: f64, minute: i64) -> DecisionRecord {
    DecisionRecord {
        decision_id: uuid::Uuid::new_v4(),
        symbol: "BTCUSDT".into(),
        signal: BetSignal::Yes,
        backup_signal: None,
        p_raw: p_yes,
        p_yes,
        band_probability: None,
        edge: p_yes - 0.55,
        ev: 0.2,
        is_bettable: true,
        gate_failures: vec![],
        distance_to_strike: Some(-1_000.0),
        volatility: 0.01,
        current_price: LAST_CLOSE,
        predicted_price: None,
        agreement: 3,
        reasons: vec![],
        matched_market_id: Some(market_id.into()),
        market_kind: Some("binary".into()),
        resolve_at: None,
        flags: vec![],
        timestamp: make_now() - Duration::days(2) + Duration::minutes(minute),
    }
}

#[tokio::test]
async fn test_settled_outcomes_refit_calibration() {
    let store = SqliteOutcomeStore::connect_with("sqlite::memory:", 1).await.unwrap();
    for i in 0..10 {
        store
            .append(&make_settled_decision(&format!("m{i}"), 0.8, i))
            .await
            .unwrap();
    }
    for i in 0..10 {
        let winner = if i < 6 { BetSignal::Yes } else { BetSignal::No };
        assert_eq!(store.record_outcome(&format!("m{i}"), winner).await.unwrap(), 1);
    }

    let resolved = store
        .get_resolved_decisions(make_now() - Duration::days(14))
        .await
        .unwrap();
    assert_eq!(resolved.len(), 10);
    assert_eq!(resolved.iter().filter(|(_, won)| *won).count(), 6);

    // Predicted 80%, won 60%: the fit pulls 0.8 down to 0.6.
    let params = fit_calibration(&resolved, &CalibrationConfig::default(), make_now()).unwrap();
    assert!((params.apply(0.8) - 0.6).abs() < 1e-6, "apply(0.8) = {}", params.apply(0.8));
    assert!(params.slope > 0.0 && params.slope < 1.0);

    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(66000)),
        binary_odds(),
    ));
    let engine = make_engine(Arc::new(MockDataSource::new()), catalog, fresh_calibration());
    let before = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    engine.reload_calibration(params.clone()).unwrap();
    let after = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    assert_eq!(after.p_raw, before.p_raw);
    assert!((after.p_yes - params.apply(before.p_raw)).abs() < 1e-9);
    assert!(after.p_yes < before.p_yes);
    assert!(!after.has_flag(DecisionFlag::StaleCalibration));
}

#[tokio::test]
async fn test_yes_only_history_keeps_bearish_cycle_on_no() {
    let store = SqliteOutcomeStore::connect_with("sqlite::memory:", 1).await.unwrap();
    // Two YES buckets, 0.65 and 0.85, that both resolved YES 13 times in 20
    for i in 0..40 {
        let p = if i < 20 { 0.65 } else { 0.85 };
        store
            .append(&make_settled_decision(&format!("m{i}"), p, i))
            .await
            .unwrap();
    }
    for i in 0..40 {
        let winner = if i % 20 < 13 { BetSignal::Yes } else { BetSignal::No };
        store.record_outcome(&format!("m{i}"), winner).await.unwrap();
    }
    let resolved = store
        .get_resolved_decisions(make_now() - Duration::days(14))
        .await
        .unwrap();
    let params = fit_calibration(&resolved, &CalibrationConfig::default(), make_now()).unwrap();
    assert!((params.apply(0.5) - 0.5).abs() < 1e-12);

    let data = Arc::new(MockDataSource::new());
    data.set_bearish("BTCUSDT");
    data.set_price("BTCUSDT", 91_440.0);
    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(94000)),
        binary_odds(),
    ));
    let engine = make_engine(data, catalog, fresh_calibration());
    let before = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();
    assert_eq!(before.signal, BetSignal::No);

    engine.reload_calibration(params).unwrap();
    let after = engine.evaluate_at("BTCUSDT", make_now()).await.unwrap();

    // Damped toward 0.5, never across it
    assert_eq!(after.signal, BetSignal::No);
    assert!(after.p_yes < 0.5, "p_yes {}", after.p_yes);
    assert!(after.p_yes > before.p_yes);
}

#[tokio::test]
async fn test_repeated_sweeps_on_one_market_do_not_refit() {
    let store = SqliteOutcomeStore::connect_with("sqlite::memory:", 1).await.unwrap();
    // A sweep every minute for 45 minutes, all on the same market
    for minute in 0..45 {
        store
            .append(&make_settled_decision("BTC-1400", 0.8, minute))
            .await
            .unwrap();
    }
    assert_eq!(store.record_outcome("BTC-1400", BetSignal::Yes).await.unwrap(), 45);

    let resolved = store
        .get_resolved_decisions(make_now() - Duration::days(14))
        .await
        .unwrap();
    assert_eq!(resolved.len(), 45);
    // One outcome is one sample, far short of min_samples
    assert!(fit_calibration(&resolved, &CalibrationConfig::default(), make_now()).is_none());
}
