//! AUGUR: signal generation and decision engine for short-duration
//! crypto prediction markets.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores calibration from disk, then sweeps every configured symbol on
//! a fixed cadence and refits calibration on its own schedule, with
//! graceful shutdown. `--backtest` replays recent history instead.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use augur::alerts::{AlertDispatcher, AlertSink, DiscordWebhook, LogSink};
use augur::backtest::{Backtester, ReplayFeed};
use augur::calibration::{fit_calibration, CalibrationConfig, CalibrationHandle, CalibrationParams};
use augur::config::AppConfig;
use augur::dashboard::{self, DashboardState};
use augur::data::binance::BinanceClient;
use augur::data::simulated::SimulatedFeed;
use augur::data::MarketDataSource;
use augur::engine::{DecisionEngine, EngineSettings, SweepReport};
use augur::platforms::simulated::ScheduledCatalog;
use augur::platforms::unhedged::UnhedgedClient;
use augur::platforms::MarketCatalog;
use augur::storage::{self, OutcomeStore, SqliteOutcomeStore};

const BANNER: &str = r#"
    _   _   _  ___ _   _ ___
   /_\ | | | |/ __| | | | _ \
  / _ \| |_| | (_ | |_| |   /
 /_/ \_\\___/ \___|\___/|_|_\

  Signal & Decision Engine
  v0.1.0
"#;

/// Parsed command line: `augur [config.toml] [--once | --backtest]`.
struct Args {
    config_path: String,
    once: bool,
    backtest: bool,
}

fn parse_args() -> Args {
    let mut config_path = None;
    let mut once = false;
    let mut backtest = false;
    for arg in std::env::args().skip(1) {
        if arg == "--once" {
            once = true;
        } else if arg == "--backtest" {
            backtest = true;
        } else if config_path.is_none() {
            config_path = Some(arg);
        }
    }
    Args {
        config_path: config_path.unwrap_or_else(|| "config.toml".to_string()),
        once,
        backtest,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = parse_args();
    let cfg = AppConfig::load(&args.config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %args.config_path,
        symbols = ?cfg.engine.symbols,
        sweep_interval_secs = cfg.engine.sweep_interval_secs,
        demo_mode = cfg.engine.demo_mode,
        "AUGUR starting up"
    );

    // -- Restore calibration ---------------------------------------------

    let params = match storage::load_params(Some(&cfg.calibration.params_path)) {
        Ok(Some(p)) => p,
        Ok(None) => CalibrationParams::identity(),
        Err(e) => {
            warn!(error = %e, "Saved calibration unreadable, starting from identity");
            CalibrationParams::identity()
        }
    };
    let calibration = match params.validate() {
        Ok(()) => CalibrationHandle::new(params),
        Err(e) => {
            warn!(error = %e, "Saved calibration rejected, starting from identity");
            CalibrationHandle::default()
        }
    };

    // -- Collaborators ---------------------------------------------------

    let (data, catalog): (Arc<dyn MarketDataSource>, Arc<dyn MarketCatalog>) = if cfg.engine.demo_mode {
        info!("Demo mode: simulated feed and scheduled catalog");
        (
            Arc::new(SimulatedFeed::new()),
            Arc::new(ScheduledCatalog::new(SimulatedFeed::new())),
        )
    } else {
        let api_key = AppConfig::resolve_secret(cfg.data_sources.unhedged_api_key_env.as_deref());
        if api_key.is_none() {
            warn!("No Unhedged API key configured, listing markets anonymously");
        }
        (
            Arc::new(BinanceClient::new(cfg.data_sources.binance_hosts.clone())?),
            Arc::new(UnhedgedClient::new(cfg.data_sources.unhedged_base_url.clone(), api_key)?),
        )
    };

    if args.backtest {
        return run_backtest(&cfg, data.as_ref(), calibration).await;
    }

    let engine = Arc::new(DecisionEngine::new(
        data,
        catalog,
        calibration.clone(),
        EngineSettings::from_config(&cfg),
    ));

    let store = SqliteOutcomeStore::connect(&cfg.storage.database_url).await?;

    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];
    match AppConfig::resolve_secret(cfg.alerts.discord_webhook_env.as_deref()) {
        Some(url) => sinks.push(Arc::new(DiscordWebhook::new(url)?)),
        None => info!("No Discord webhook configured, alerts go to the log only"),
    }
    let dispatcher = AlertDispatcher::new(sinks, cfg.alerts.cooldown_secs, cfg.alerts.only_bettable);

    let dashboard_state = Arc::new(DashboardState::new(calibration));
    if cfg.dashboard.enabled && !args.once {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port);
    }

    if args.once {
        let report = engine.sweep(&cfg.engine.symbols).await;
        publish_sweep(&report, &store, &dispatcher, &dashboard_state).await;
        info!("Single sweep complete, exiting.");
        return Ok(());
    }

    // -- Main loop -------------------------------------------------------

    let mut sweep_tick = tokio::time::interval(Duration::from_secs(cfg.engine.sweep_interval_secs));
    sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut refit_tick =
        tokio::time::interval(Duration::from_secs(cfg.calibration.refresh_interval_secs.max(1)));
    refit_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.engine.sweep_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = sweep_tick.tick() => {
                let report = engine.sweep(&cfg.engine.symbols).await;
                publish_sweep(&report, &store, &dispatcher, &dashboard_state).await;
            }
            _ = refit_tick.tick() => {
                if let Err(e) = refresh_calibration(&engine, &store, &cfg.calibration).await {
                    error!(error = %e, "Calibration refresh failed, keeping current params");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("AUGUR shut down cleanly.");
    Ok(())
}

/// Log, persist, alert and publish one finished sweep. Nothing here can
/// fail the loop: each step logs its own errors.
async fn publish_sweep(
    report: &SweepReport,
    store: &dyn OutcomeStore,
    dispatcher: &AlertDispatcher,
    dashboard: &DashboardState,
) {
    log_sweep_report(report);

    for record in &report.records {
        if let Err(e) = store.append(record).await {
            error!(symbol = %record.symbol, error = %e, "Failed to persist decision");
        }
        dispatcher.dispatch(record).await;
    }

    dashboard.record_sweep(report).await;
}

/// Refit calibration from recently settled decisions, swap it in and save
/// it. Too few samples keeps the current snapshot.
async fn refresh_calibration(
    engine: &DecisionEngine,
    store: &dyn OutcomeStore,
    cfg: &CalibrationConfig,
) -> Result<()> {
    let now = Utc::now();
    let since = now - chrono::Duration::days(cfg.lookback_days);
    let resolved = store.get_resolved_decisions(since).await?;

    let Some(params) = fit_calibration(&resolved, cfg, now) else {
        return Ok(());
    };

    engine.reload_calibration(params.clone())?;
    storage::save_params(&params, Some(&cfg.params_path))?;
    Ok(())
}

/// Replay the configured window for every symbol over recorded candles
/// and log what a calibration refit on the replayed outcomes would give.
/// Nothing is persisted.
async fn run_backtest(
    cfg: &AppConfig,
    data: &dyn MarketDataSource,
    calibration: CalibrationHandle,
) -> Result<()> {
    let end = Utc::now();
    let start = end - chrono::Duration::hours(cfg.backtest.hours);
    info!(
        hours = cfg.backtest.hours,
        step_minutes = cfg.backtest.step_minutes,
        "Backtest: fetching history"
    );

    let mut series = Vec::new();
    for symbol in &cfg.engine.symbols {
        for setting in &cfg.timeframes {
            match data
                .get_candles(symbol, setting.timeframe, cfg.backtest.history_candles)
                .await
            {
                Ok(s) => series.push(s),
                Err(e) => warn!(symbol = %symbol, timeframe = %setting.timeframe, error = %e, "No history, timeframe left out"),
            }
        }
    }

    let replay = Arc::new(ReplayFeed::new(series, start));
    let backtester = Backtester::new(
        replay,
        calibration,
        EngineSettings::from_config(cfg),
        chrono::Duration::minutes(cfg.backtest.step_minutes),
    );

    let mut resolved = Vec::new();
    for symbol in &cfg.engine.symbols {
        let report = backtester.run(symbol, start, end).await;
        resolved.extend(report.resolved_decisions);
    }

    match fit_calibration(&resolved, &cfg.calibration, end) {
        Some(params) => info!(
            slope = format!("{:.4}", params.slope),
            intercept = format!("{:.4}", params.intercept),
            samples = params.sample_size,
            "Backtest: calibration fit on replayed outcomes (not saved)"
        ),
        None => info!(decisions = resolved.len(), "Backtest: too few replayed markets to fit calibration"),
    }
    Ok(())
}

/// Log a one-line sweep summary.
fn log_sweep_report(report: &SweepReport) {
    let bettable: Vec<&str> = report.bettable().iter().map(|r| r.symbol.as_str()).collect();
    let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
    if report.records.is_empty() && !report.failures.is_empty() {
        error!(
            failed = report.failures.len(),
            elapsed_ms,
            "Sweep produced no decisions"
        );
        return;
    }
    info!(
        evaluated = report.symbols_evaluated(),
        decided = report.records.len(),
        failed = report.failures.len(),
        bettable = ?bettable,
        elapsed_ms,
        "Sweep complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("augur=info"));

    let json_logging = std::env::var("AUGUR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
