//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section falls back to its defaults when absent. Secrets (API keys,
//! webhook URLs) are referenced by env-var name in the config and resolved
//! at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::backtest::BacktestConfig;
use crate::calibration::CalibrationConfig;
use crate::signal::{FusionConfig, IndicatorConfig, ScoringConfig};
use crate::strategy::edge::EdgeConfig;
use crate::strategy::risk::RiskConfig;
use crate::types::Timeframe;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub timeframes: Vec<TimeframeSetting>,
    pub indicators: IndicatorConfig,
    pub scoring: ScoringConfig,
    pub fusion: FusionConfig,
    pub edge: EdgeConfig,
    pub risk: RiskConfig,
    pub calibration: CalibrationConfig,
    pub data_sources: DataSourcesConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
    pub alerts: AlertsConfig,
    pub backtest: BacktestConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub sweep_interval_secs: u64,
    /// Simulated feed and scheduled catalog instead of live venues.
    pub demo_mode: bool,
    pub volatility_window: usize,
    pub default_horizon_minutes: i64,
    pub min_timeframes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()],
            sweep_interval_secs: 60,
            demo_mode: false,
            volatility_window: 30,
            default_horizon_minutes: 60,
            min_timeframes: 2,
        }
    }
}

/// One timeframe the engine scores, with its fusion weight.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TimeframeSetting {
    pub timeframe: Timeframe,
    pub weight: f64,
    /// Candles requested per cycle.
    #[serde(default = "default_candles")]
    pub candles: usize,
}

fn default_candles() -> usize {
    100
}

impl TimeframeSetting {
    pub fn defaults() -> Vec<Self> {
        [(Timeframe::Min5, 0.40), (Timeframe::Min15, 0.35), (Timeframe::Hour1, 0.25)]
            .into_iter()
            .map(|(timeframe, weight)| Self {
                timeframe,
                weight,
                candles: default_candles(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataSourcesConfig {
    /// Tried in order; empty means the built-in host list.
    pub binance_hosts: Vec<String>,
    pub unhedged_base_url: Option<String>,
    pub unhedged_api_key_env: Option<String>,
}

impl Default for DataSourcesConfig {
    fn default() -> Self {
        Self {
            binance_hosts: Vec::new(),
            unhedged_base_url: None,
            unhedged_api_key_env: Some("UNHEDGED_API_KEY".into()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://augur.db?mode=rwc".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub discord_webhook_env: Option<String>,
    /// Per-symbol quiet period after an alert.
    pub cooldown_secs: u64,
    pub only_bettable: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            discord_webhook_env: Some("DISCORD_WEBHOOK_URL".into()),
            cooldown_secs: 120,
            only_bettable: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        if config.timeframes.is_empty() {
            config.timeframes = TimeframeSetting::defaults();
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.symbols.is_empty() {
            anyhow::bail!("engine.symbols must not be empty");
        }
        if self.engine.sweep_interval_secs == 0 {
            anyhow::bail!("engine.sweep_interval_secs must be positive");
        }
        if let Some(tf) = self.timeframes.iter().find(|t| !(t.weight > 0.0)) {
            anyhow::bail!("timeframe {} has non-positive weight {}", tf.timeframe, tf.weight);
        }
        if self.timeframes.len() < self.engine.min_timeframes {
            anyhow::bail!(
                "{} timeframes configured but engine.min_timeframes is {}",
                self.timeframes.len(),
                self.engine.min_timeframes
            );
        }
        let risk = &self.risk;
        if risk.alert_window_start >= 60 || risk.alert_window_end >= 60 {
            anyhow::bail!(
                "alert window :{}-:{} must lie within 0..60",
                risk.alert_window_start,
                risk.alert_window_end
            );
        }
        if self.backtest.hours <= 0 || self.backtest.step_minutes <= 0 {
            anyhow::bail!("backtest.hours and backtest.step_minutes must be positive");
        }
        if risk.max_minutes_to_close <= 0 {
            anyhow::bail!("risk.max_minutes_to_close must be positive");
        }
        if !(risk.volatility_multiplier >= 0.0) {
            anyhow::bail!("risk.volatility_multiplier must be >= 0");
        }
        if !(self.fusion.probability_floor < self.fusion.probability_ceiling) {
            anyhow::bail!("fusion probability floor must be below the ceiling");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an optional env-var reference into a secret. Unset or empty
    /// variables yield `None`.
    pub fn resolve_secret(env_name: Option<&str>) -> Option<SecretString> {
        env_name
            .and_then(|name| Self::resolve_env(name).ok())
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
    }
}
