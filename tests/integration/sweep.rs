//! Multi-symbol sweeps: one failing symbol never takes down the others,
//! and a finished sweep flows into the store and status API.

use rust_decimal_macros::dec;
use std::sync::Arc;

use augur::dashboard::DashboardState;
use augur::storage::{OutcomeStore, SqliteOutcomeStore};
use augur::types::{BetSignal, MarketOdds};

use crate::fixtures::{fresh_calibration, make_binary_market, make_engine, make_now};
use crate::mock_collaborators::{MockCatalog, MockDataSource};

fn make_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "SOLUSDT"].iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_sweep_isolates_failing_symbol() {
    let data = Arc::new(MockDataSource::new());
    data.fail_symbol("ETHUSDT");
    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(66000)),
        MarketOdds::from_binary_volumes(55.0, 45.0),
    ));
    let engine = make_engine(data, catalog, fresh_calibration());

    let report = engine.sweep_at(&make_symbols(), make_now()).await;

    assert_eq!(report.symbols_evaluated(), 3);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "ETHUSDT");
    assert!(report.failures[0].error.contains("upstream unavailable"));

    let bettable: Vec<&str> = report.bettable().iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(bettable, vec!["BTCUSDT"]);
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn test_sweep_with_every_symbol_failing() {
    let data = Arc::new(MockDataSource::new());
    data.set_error("exchange maintenance");
    let engine = make_engine(data, Arc::new(MockCatalog::new()), fresh_calibration());

    let report = engine.sweep_at(&make_symbols(), make_now()).await;

    assert!(report.records.is_empty());
    assert_eq!(report.failures.len(), 3);
}

#[tokio::test]
async fn test_sweep_results_reach_store_and_dashboard() {
    let data = Arc::new(MockDataSource::new());
    data.fail_symbol("SOLUSDT");
    let catalog = Arc::new(MockCatalog::with_market(
        make_binary_market("BTC-1500", "BTCUSDT", dec!(66000)),
        MarketOdds::from_binary_volumes(55.0, 45.0),
    ));
    let calibration = fresh_calibration();
    let engine = make_engine(data, catalog, calibration.clone());
    let store = SqliteOutcomeStore::connect_with("sqlite::memory:", 1).await.unwrap();
    let dashboard = DashboardState::new(calibration);

    let report = engine.sweep_at(&make_symbols(), make_now()).await;
    for record in &report.records {
        store.append(record).await.unwrap();
    }
    dashboard.record_sweep(&report).await;

    assert_eq!(store.record_outcome("BTC-1500", BetSignal::Yes).await.unwrap(), 1);
    let resolved = store.get_resolved_decisions(make_now() - chrono::Duration::hours(1)).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].1);

    let latest = dashboard.latest.read().await;
    assert_eq!(latest.len(), 2);
    assert!(latest.contains_key("BTCUSDT"));
    assert!(latest.contains_key("ETHUSDT"));
    let summary = dashboard.last_sweep.read().await.clone().unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.bettable, vec!["BTCUSDT".to_string()]);
}
