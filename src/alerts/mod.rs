//! Alert delivery.
//!
//! Renders decision records into human-readable alerts and fans them out
//! to every configured sink. Sinks fail independently: a webhook outage is
//! logged and never stops the log sink (or the next sweep).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{BetSignal, DecisionRecord};

const COLOR_GREEN: u32 = 5_763_719;
const COLOR_RED: u32 = 15_548_997;
const COLOR_YELLOW: u32 = 16_776_960;

/// Reasons shown per alert; the rest are in the stored record.
const MAX_REASONS: usize = 5;

const MAX_COOLDOWN_SECS: u64 = 86_400;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub symbol: String,
    pub title: String,
    pub lines: Vec<String>,
    pub color: u32,
    /// `100 * max(p, 1 - p)`.
    pub confidence: f64,
}

impl Alert {
    pub fn text(&self) -> String {
        let mut out = self.title.clone();
        for line in &self.lines {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

pub fn render_alert(record: &DecisionRecord) -> Alert {
    let confidence = 100.0 * record.win_probability();
    let color = match record.signal {
        BetSignal::Yes | BetSignal::High => COLOR_GREEN,
        BetSignal::No | BetSignal::Low => COLOR_RED,
        BetSignal::Mid | BetSignal::Hold => COLOR_YELLOW,
    };

    let mut lines = Vec::new();
    match (&record.matched_market_id, &record.market_kind) {
        (Some(id), Some(kind)) => lines.push(format!("Market: {id} ({kind})")),
        (Some(id), None) => lines.push(format!("Market: {id}")),
        _ => lines.push("Market: none open".to_string()),
    }
    match record.backup_signal {
        Some(backup) => lines.push(format!("Signal: {} (backup {backup})", record.signal)),
        None => lines.push(format!("Signal: {}", record.signal)),
    }
    lines.push(format!("Confidence: {confidence:.1}%"));
    lines.push(format!(
        "Edge: {:+.1}% | EV: {:+.3}",
        record.edge * 100.0,
        record.ev
    ));
    lines.push(format!("Price: {:.2}", record.current_price));
    if let Some(predicted) = record.predicted_price {
        lines.push(format!("Predicted: {predicted:.2}"));
    }
    if let Some(distance) = record.distance_to_strike {
        lines.push(format!("Distance to strike: {distance:+.2}"));
    }
    if let Some(at) = record.resolve_at {
        lines.push(format!("Resolves: {}", at.format("%H:%M UTC")));
    }
    for reason in record.reasons.iter().take(MAX_REASONS) {
        lines.push(format!("- {reason}"));
    }
    for failure in &record.gate_failures {
        lines.push(format!("x {failure}"));
    }
    if !record.flags.is_empty() {
        let flags: Vec<String> = record
            .flags
            .iter()
            .map(|f| format!("{f:?}"))
            .collect();
        lines.push(format!("Flags: {}", flags.join(", ")));
    }

    Alert {
        symbol: record.symbol.clone(),
        title: format!("Signal Alert: {} {}", record.symbol, record.signal),
        lines,
        color,
        confidence,
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the tracing log.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, alert: &Alert) -> Result<()> {
        info!(
            symbol = %alert.symbol,
            confidence = format!("{:.1}", alert.confidence),
            alert = %alert.text(),
            "ALERT"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct DiscordPayload<'a> {
    username: &'a str,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

/// Posts alerts as embeds to a Discord webhook.
pub struct DiscordWebhook {
    http: Client,
    url: SecretString,
}

impl DiscordWebhook {
    pub fn new(url: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("AUGUR/0.1.0")
            .build()
            .context("Failed to build HTTP client for Discord")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl AlertSink for DiscordWebhook {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = DiscordPayload {
            username: "AUGUR",
            embeds: vec![DiscordEmbed {
                title: alert.title.clone(),
                description: alert.lines.join("\n"),
                color: alert.color,
                timestamp: Utc::now().to_rfc3339(),
            }],
        };

        let resp = self
            .http
            .post(self.url.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("Discord webhook request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Discord webhook error {status}: {body}");
        }
        debug!(symbol = %alert.symbol, "Discord alert delivered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
    cooldown: Duration,
    only_bettable: bool,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>, cooldown_secs: u64, only_bettable: bool) -> Self {
        Self {
            sinks,
            cooldown: Duration::seconds(cooldown_secs.min(MAX_COOLDOWN_SECS) as i64),
            only_bettable,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub async fn dispatch(&self, record: &DecisionRecord) -> bool {
        self.dispatch_at(record, Utc::now()).await
    }

    /// Send `record` to every sink unless it is filtered or the symbol is
    /// cooling down. Returns whether at least one sink accepted it.
    pub async fn dispatch_at(&self, record: &DecisionRecord, now: DateTime<Utc>) -> bool {
        if self.only_bettable && !record.is_bettable {
            return false;
        }
        if let Some(last) = self.last_sent.lock().await.get(&record.symbol) {
            if now - *last < self.cooldown {
                debug!(symbol = %record.symbol, "Alert suppressed by cooldown");
                return false;
            }
        }

        let alert = render_alert(record);
        let results = futures::future::join_all(self.sinks.iter().map(|sink| sink.send(&alert))).await;

        let mut delivered = false;
        for result in results {
            match result {
                Ok(()) => delivered = true,
                Err(e) => warn!(symbol = %record.symbol, error = %e, "Alert sink failed"),
            }
        }
        if delivered {
            self.last_sent.lock().await.insert(record.symbol.clone(), now);
        }
        delivered
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionFlag, GateFailure};
    use chrono::TimeZone;

    fn make_record(signal: BetSignal, p_yes: f64, is_bettable: bool) -> DecisionRecord {
        DecisionRecord {
            decision_id: uuid::Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            signal,
            backup_signal: None,
            p_raw: p_yes,
            p_yes,
            band_probability: None,
            edge: 0.12,
            ev: 0.3,
            is_bettable,
            gate_failures: vec![],
            distance_to_strike: Some(-1_200.0),
            volatility: 0.01,
            current_price: 67_200.0,
            predicted_price: Some(67_600.0),
            agreement: 3,
            reasons: vec!["[5m] MACD histogram positive".into()],
            matched_market_id: Some("m1".into()),
            market_kind: Some("binary".into()),
            resolve_at: None,
            flags: vec![],
            timestamp: Utc::now(),
        }
    }

    fn make_counting_sink(expected: usize) -> MockAlertSink {
        let mut sink = MockAlertSink::new();
        sink.expect_send().times(expected).returning(|_| Ok(()));
        sink
    }

    #[test]
    fn test_render_confidence_uses_recommended_side() {
        let yes = render_alert(&make_record(BetSignal::Yes, 0.8, true));
        assert!((yes.confidence - 80.0).abs() < 1e-9);
        assert_eq!(yes.color, COLOR_GREEN);

        let no = render_alert(&make_record(BetSignal::No, 0.3, true));
        assert!((no.confidence - 70.0).abs() < 1e-9);
        assert_eq!(no.color, COLOR_RED);
        assert!(no.title.contains("BTCUSDT NO"));

        // Band alerts report the band's probability, not P(YES)
        let mut band = make_record(BetSignal::High, 0.87, true);
        band.band_probability = Some(0.56);
        band.market_kind = Some("interval".into());
        let high = render_alert(&band);
        assert!((high.confidence - 56.0).abs() < 1e-9);
        assert_eq!(high.color, COLOR_GREEN);
    }

    #[test]
    fn test_render_lists_failures_and_flags() {
        let mut record = make_record(BetSignal::Yes, 0.6, false);
        record.gate_failures = vec![GateFailure::InsufficientEdge {
            edge: 0.01,
            min_edge: 0.05,
        }];
        record.flags = vec![DecisionFlag::StaleCalibration];
        let text = render_alert(&record).text();
        assert!(text.contains("Edge 1.0% below minimum 5.0%"));
        assert!(text.contains("StaleCalibration"));
        assert!(text.contains("MACD histogram positive"));
    }

    #[tokio::test]
    async fn test_only_bettable_filter() {
        let dispatcher = AlertDispatcher::new(vec![Arc::new(make_counting_sink(0))], 120, true);
        assert!(!dispatcher.dispatch(&make_record(BetSignal::Yes, 0.8, false)).await);

        let dispatcher = AlertDispatcher::new(vec![Arc::new(make_counting_sink(1))], 120, false);
        assert!(dispatcher.dispatch(&make_record(BetSignal::Yes, 0.8, false)).await);
    }

    #[tokio::test]
    async fn test_cooldown_per_symbol() {
        let dispatcher = AlertDispatcher::new(vec![Arc::new(make_counting_sink(2))], 120, true);
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        let record = make_record(BetSignal::Yes, 0.8, true);
        assert!(dispatcher.dispatch_at(&record, t0).await);
        assert!(!dispatcher.dispatch_at(&record, t0 + Duration::seconds(60)).await);
        assert!(dispatcher.dispatch_at(&record, t0 + Duration::seconds(121)).await);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let mut broken = MockAlertSink::new();
        broken
            .expect_send()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("webhook 500")));
        let dispatcher = AlertDispatcher::new(
            vec![Arc::new(broken), Arc::new(make_counting_sink(1))],
            120,
            true,
        );
        assert!(dispatcher.dispatch(&make_record(BetSignal::Yes, 0.8, true)).await);
    }

    #[tokio::test]
    async fn test_all_sinks_failing_does_not_start_cooldown() {
        let mut broken = MockAlertSink::new();
        broken
            .expect_send()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("offline")));
        let dispatcher = AlertDispatcher::new(vec![Arc::new(broken)], 120, true);
        let record = make_record(BetSignal::Yes, 0.8, true);
        assert!(!dispatcher.dispatch(&record).await);
        assert!(!dispatcher.dispatch(&record).await);
    }

    #[tokio::test]
    async fn test_log_sink_accepts() {
        let alert = render_alert(&make_record(BetSignal::Mid, 0.5, true));
        assert!(LogSink.send(&alert).await.is_ok());
        assert_eq!(alert.color, COLOR_YELLOW);
    }
}
