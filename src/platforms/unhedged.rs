//! Unhedged market catalog.
//!
//! API: `GET /markets` (listing) and `GET /markets/{id}` (detail)
//! Base URL: https://unhedged.gg/api/v1
//! Auth: `Authorization: Bearer {key}`
//!
//! The listing only carries free-text questions, so contract terms are
//! parsed out of them: "above $67,000" for binary strikes and
//! "$3,450 - $3,520" for interval ranges. Odds are the crowd's volume
//! split across outcomes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, warn};

use super::schedule::{binary_window, interval_window};
use super::MarketCatalog;
use crate::types::{ActiveMarket, EngineError, MarketKind, MarketOdds, MarketStatus};

pub const DEFAULT_BASE_URL: &str = "https://unhedged.gg/api/v1";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<RawMarket>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: RawMarket,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    question: String,
    /// "ACTIVE", "UPCOMING", "CLOSED", "RESOLVED".
    #[serde(default)]
    status: String,
    /// Exchange symbol, when the venue tags it.
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    strike: Option<f64>,
    #[serde(default)]
    lower: Option<f64>,
    #[serde(default)]
    upper: Option<f64>,
    #[serde(default)]
    open_time: Option<DateTime<Utc>>,
    #[serde(default)]
    close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    resolve_time: Option<DateTime<Utc>>,
    #[serde(default)]
    outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawOutcome {
    #[serde(default, alias = "name")]
    label: String,
    #[serde(default)]
    volume: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct UnhedgedClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl UnhedgedClient {
    pub fn new(base_url: Option<String>, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("AUGUR/0.1.0")
            .build()
            .context("Failed to build HTTP client for Unhedged")?;
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "Fetching Unhedged");

        let mut req = self.http.get(&url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        let resp = req.send().await.context("Unhedged API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Unhedged API error {status}: {body}");
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to parse Unhedged response from {url}"))
    }
}

#[async_trait]
impl MarketCatalog for UnhedgedClient {
    async fn list_active_markets(&self, symbol: &str) -> Result<Vec<ActiveMarket>, EngineError> {
        let listing: ListResponse = self
            .get("/markets")
            .await
            .map_err(|e| EngineError::Catalog(format!("{e:#}")))?;

        let now = Utc::now();
        let markets: Vec<ActiveMarket> = listing
            .data
            .iter()
            .filter_map(|raw| to_active_market(raw, now))
            .filter(|m| m.symbol.eq_ignore_ascii_case(symbol))
            .collect();
        debug!(symbol, listed = listing.data.len(), matched = markets.len(), "Unhedged markets");
        Ok(markets)
    }

    async fn market_odds(&self, market: &ActiveMarket) -> Result<Option<MarketOdds>, EngineError> {
        let path = format!("/markets/{}", urlencoding::encode(&market.market_id));
        let detail: DetailResponse = self
            .get(&path)
            .await
            .map_err(|e| EngineError::Catalog(format!("{e:#}")))?;
        Ok(odds_from_outcomes(&market.kind, &detail.data.outcomes))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Convert a listing entry. Entries whose symbol or contract terms cannot
/// be read are skipped.
fn to_active_market(raw: &RawMarket, now: DateTime<Utc>) -> Option<ActiveMarket> {
    let text = if raw.question.is_empty() { &raw.name } else { &raw.question };
    let tagged = raw.symbol.as_deref().and_then(extract_symbol);
    let Some(symbol) = tagged
        .or_else(|| extract_symbol(text))
        .or_else(|| extract_symbol(&raw.name))
    else {
        debug!(market_id = %raw.id, "No recognisable symbol, skipping");
        return None;
    };

    let is_interval = raw.outcomes.len() == 3
        || raw
            .outcomes
            .iter()
            .any(|o| o.label.eq_ignore_ascii_case("MID"));
    let kind = if is_interval {
        let explicit = raw
            .lower
            .and_then(Decimal::from_f64)
            .zip(raw.upper.and_then(Decimal::from_f64))
            .filter(|(lo, hi)| lo < hi);
        explicit
            .or_else(|| parse_range(text))
            .map(|(lower, upper)| MarketKind::Interval { lower, upper })
    } else {
        raw.strike
            .and_then(Decimal::from_f64)
            .or_else(|| parse_strike(text))
            .map(|strike_price| MarketKind::Binary { strike_price })
    };
    let Some(kind) = kind else {
        warn!(market_id = %raw.id, question = %text, "Could not parse contract terms, skipping");
        return None;
    };

    let window = if is_interval {
        interval_window(now)
    } else {
        binary_window(now)
    };

    Some(ActiveMarket {
        market_id: raw.id.clone(),
        symbol,
        question: text.clone(),
        kind,
        open_at: raw.open_time.unwrap_or(window.open_at),
        close_at: raw.close_time.unwrap_or(window.close_at),
        resolve_at: raw.resolve_time.unwrap_or(window.resolve_at),
        status: parse_status(&raw.status),
    })
}

fn parse_status(status: &str) -> MarketStatus {
    match status.to_ascii_uppercase().as_str() {
        "UPCOMING" | "SCHEDULED" | "PENDING" => MarketStatus::Scheduled,
        "CLOSED" | "LOCKED" | "ENDED" => MarketStatus::Closed,
        "RESOLVED" | "SETTLED" => MarketStatus::Resolved,
        // ACTIVE, blank, unknown: the clock decides
        _ => MarketStatus::Open,
    }
}

/// Exchange symbol named in free text, e.g. "Will Bitcoin be above..." -> BTCUSDT.
pub fn extract_symbol(text: &str) -> Option<String> {
    const NAMES: &[(&str, &str)] = &[
        ("BITCOIN", "BTCUSDT"),
        ("BTC", "BTCUSDT"),
        ("ETHEREUM", "ETHUSDT"),
        ("ETH", "ETHUSDT"),
        ("SOLANA", "SOLUSDT"),
        ("SOL", "SOLUSDT"),
        ("XRP", "XRPUSDT"),
    ];
    let upper = text.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    NAMES
        .iter()
        .find(|(name, _)| {
            words
                .iter()
                .any(|w| *w == *name || w.strip_suffix("USDT") == Some(*name))
        })
        .map(|(_, symbol)| symbol.to_string())
}

/// Every `$`-prefixed amount in `text`, in order. Thousands separators are
/// dropped.
pub fn dollar_amounts(text: &str) -> Vec<Decimal> {
    let mut out = Vec::new();
    for (idx, _) in text.match_indices('$') {
        let digits: String = text[idx + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
            .filter(|c| *c != ',')
            .collect();
        let digits = digits.trim_end_matches('.');
        if let Ok(value) = Decimal::from_str(digits) {
            out.push(value);
        }
    }
    out
}

/// Strike of a binary question: the first dollar amount after a comparison
/// phrase.
pub fn parse_strike(text: &str) -> Option<Decimal> {
    const PHRASES: &[&str] = &["above", "below", "higher than", "lower than"];
    let lower = text.to_ascii_lowercase();
    let at = PHRASES.iter().filter_map(|p| lower.find(p)).min()?;
    dollar_amounts(&text[at..]).into_iter().next()
}

/// Bounds of an interval question: "$A - $B", returned low to high.
pub fn parse_range(text: &str) -> Option<(Decimal, Decimal)> {
    let (left, right) = text.split_once(" - ").or_else(|| text.split_once('-'))?;
    let a = dollar_amounts(left).pop()?;
    let b = dollar_amounts(&format!("${}", right.trim_start().trim_start_matches('$')))
        .into_iter()
        .next()?;
    if a == b {
        return None;
    }
    Some((a.min(b), a.max(b)))
}

/// Volume-share odds matched to the contract kind.
fn odds_from_outcomes(kind: &MarketKind, outcomes: &[RawOutcome]) -> Option<MarketOdds> {
    let volume = |label: &str| {
        outcomes
            .iter()
            .filter(|o| o.label.eq_ignore_ascii_case(label))
            .map(|o| o.volume.max(0.0))
            .sum::<f64>()
    };
    match kind {
        MarketKind::Binary { .. } => MarketOdds::from_binary_volumes(volume("YES"), volume("NO")),
        MarketKind::Interval { .. } => {
            MarketOdds::from_interval_volumes(volume("LOW"), volume("MID"), volume("HIGH"))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
