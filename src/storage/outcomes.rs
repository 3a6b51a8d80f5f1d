//! Outcome store.
//!
//! Append-only decision history in SQLite. Each row keeps the full
//! `DecisionRecord` as JSON next to the columns queries filter on.
//! Settlement fills in `won` for every decision on a market, which is what
//! the calibration fit later reads back.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::types::{BetSignal, DecisionRecord};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn append(&self, record: &DecisionRecord) -> Result<()>;

    /// Settle every decision attached to `market_id` against the outcome
    /// that won. Returns the number of decisions settled.
    async fn record_outcome(&self, market_id: &str, winning: BetSignal) -> Result<u64>;

    /// Settled decisions made at or after `since`, oldest first.
    async fn get_resolved_decisions(&self, since: DateTime<Utc>) -> Result<Vec<(DecisionRecord, bool)>>;

    async fn performance(&self, since: DateTime<Utc>) -> Result<Vec<SymbolPerformance>>;
}

/// Settled hit rate for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolPerformance {
    pub symbol: String,
    pub resolved: i64,
    pub wins: i64,
    pub win_rate: f64,
    pub bettable_resolved: i64,
    pub bettable_wins: i64,
}

/// Timestamps are stored as fixed-width RFC 3339 so they sort as text.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone)]
pub struct SqliteOutcomeStore {
    pool: SqlitePool,
}

impl SqliteOutcomeStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, 5).await
    }

    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open outcome store at {database_url}"))?;

        let store = Self { pool };
        store.init().await?;
        info!(database_url, "Outcome store ready");
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                decision_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                market_id TEXT,
                decided_at TEXT NOT NULL,
                signal TEXT NOT NULL,
                p_yes REAL NOT NULL,
                edge REAL NOT NULL,
                is_bettable INTEGER NOT NULL,
                settled_outcome TEXT,
                won INTEGER,
                record_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create decisions table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_market ON decisions (market_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_symbol_time ON decisions (symbol, decided_at)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OutcomeStore for SqliteOutcomeStore {
    async fn append(&self, record: &DecisionRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialise decision")?;
        sqlx::query(
            r#"
            INSERT INTO decisions (decision_id, symbol, market_id, decided_at, signal, p_yes, edge, is_bettable, record_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.decision_id.to_string())
        .bind(&record.symbol)
        .bind(&record.matched_market_id)
        .bind(ts(record.timestamp))
        .bind(record.signal.to_string())
        .bind(record.p_yes)
        .bind(record.edge)
        .bind(record.is_bettable)
        .bind(json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to append decision {}", record.decision_id))?;

        debug!(decision_id = %record.decision_id, symbol = %record.symbol, "Decision appended");
        Ok(())
    }

    async fn record_outcome(&self, market_id: &str, winning: BetSignal) -> Result<u64> {
        let winning = winning.to_string();
        let result = sqlx::query(
            r#"
            UPDATE decisions
            SET settled_outcome = ?, won = CASE WHEN signal = ? THEN 1 ELSE 0 END
            WHERE market_id = ? AND signal != 'HOLD'
            "#,
        )
        .bind(&winning)
        .bind(&winning)
        .bind(market_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to settle market {market_id}"))?;

        let settled = result.rows_affected();
        info!(market_id, outcome = %winning, settled, "Market settled");
        Ok(settled)
    }

    async fn get_resolved_decisions(&self, since: DateTime<Utc>) -> Result<Vec<(DecisionRecord, bool)>> {
        let rows = sqlx::query(
            r#"
            SELECT record_json, won FROM decisions
            WHERE won IS NOT NULL AND decided_at >= ?
            ORDER BY decided_at
            "#,
        )
        .bind(ts(since))
        .fetch_all(&self.pool)
        .await
        .context("Failed to read resolved decisions")?;

        rows.iter()
            .map(|row| -> Result<(DecisionRecord, bool)> {
                let json: String = row.try_get("record_json")?;
                let won: i64 = row.try_get("won")?;
                let record: DecisionRecord =
                    serde_json::from_str(&json).context("Corrupt decision row")?;
                Ok((record, won != 0))
            })
            .collect()
    }

    async fn performance(&self, since: DateTime<Utc>) -> Result<Vec<SymbolPerformance>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol,
                   COUNT(*) AS resolved,
                   COALESCE(SUM(won), 0) AS wins,
                   COALESCE(SUM(is_bettable), 0) AS bettable_resolved,
                   COALESCE(SUM(won * is_bettable), 0) AS bettable_wins
            FROM decisions
            WHERE won IS NOT NULL AND decided_at >= ?
            GROUP BY symbol
            ORDER BY symbol
            "#,
        )
        .bind(ts(since))
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute performance")?;

        rows.iter()
            .map(|row| -> Result<SymbolPerformance> {
                let resolved: i64 = row.try_get("resolved")?;
                let wins: i64 = row.try_get("wins")?;
                Ok(SymbolPerformance {
                    symbol: row.try_get("symbol")?,
                    resolved,
                    wins,
                    win_rate: if resolved > 0 { wins as f64 / resolved as f64 } else { 0.0 },
                    bettable_resolved: row.try_get("bettable_resolved")?,
                    bettable_wins: row.try_get("bettable_wins")?,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    async fn make_store() -> SqliteOutcomeStore {
        SqliteOutcomeStore::connect_with("sqlite::memory:", 1).await.unwrap()
    }

    fn make_record(symbol: &str, market: Option<&str>, signal: BetSignal, minute: u32) -> DecisionRecord {
        DecisionRecord {
            decision_id: Uuid::new_v4(),
            symbol: symbol.into(),
            signal,
            backup_signal: None,
            p_raw: 0.8,
            p_yes: 0.8,
            band_probability: None,
            edge: 0.2,
            ev: 0.4,
            is_bettable: signal == BetSignal::Yes,
            gate_failures: vec![],
            distance_to_strike: Some(-500.0),
            volatility: 0.01,
            current_price: 67_000.0,
            predicted_price: Some(67_400.0),
            agreement: 3,
            reasons: vec!["[5m] MACD histogram positive".into()],
            matched_market_id: market.map(String::from),
            market_kind: market.map(|_| "binary".to_string()),
            resolve_at: None,
            flags: vec![],
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 14, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_append_and_settle() {
        let store = make_store().await;
        let yes = make_record("BTCUSDT", Some("m1"), BetSignal::Yes, 20);
        let no = make_record("BTCUSDT", Some("m1"), BetSignal::No, 25);
        let hold = make_record("BTCUSDT", Some("m1"), BetSignal::Hold, 30);
        let other = make_record("ETHUSDT", Some("m2"), BetSignal::Yes, 30);
        for r in [&yes, &no, &hold, &other] {
            store.append(r).await.unwrap();
        }

        let settled = store.record_outcome("m1", BetSignal::Yes).await.unwrap();
        assert_eq!(settled, 2);

        let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let resolved = store.get_resolved_decisions(since).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].0.decision_id, yes.decision_id);
        assert!(resolved[0].1);
        assert_eq!(resolved[1].0, no);
        assert!(!resolved[1].1);
    }

    #[tokio::test]
    async fn test_resolved_respects_since() {
        let store = make_store().await;
        let early = make_record("BTCUSDT", Some("m1"), BetSignal::Yes, 5);
        let late = make_record("BTCUSDT", Some("m1"), BetSignal::Yes, 40);
        store.append(&early).await.unwrap();
        store.append(&late).await.unwrap();
        store.record_outcome("m1", BetSignal::No).await.unwrap();

        let since = late.timestamp - Duration::minutes(1);
        let resolved = store.get_resolved_decisions(since).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0.decision_id, late.decision_id);
    }

    #[tokio::test]
    async fn test_duplicate_append_rejected() {
        let store = make_store().await;
        let record = make_record("BTCUSDT", None, BetSignal::Yes, 10);
        store.append(&record).await.unwrap();
        assert!(store.append(&record).await.is_err());
    }

    #[tokio::test]
    async fn test_performance_per_symbol() {
        let store = make_store().await;
        store.append(&make_record("BTCUSDT", Some("m1"), BetSignal::Yes, 10)).await.unwrap();
        store.append(&make_record("BTCUSDT", Some("m1"), BetSignal::No, 11)).await.unwrap();
        store.append(&make_record("ETHUSDT", Some("m2"), BetSignal::Yes, 12)).await.unwrap();
        store.append(&make_record("SOLUSDT", None, BetSignal::Yes, 13)).await.unwrap();
        store.record_outcome("m1", BetSignal::Yes).await.unwrap();
        store.record_outcome("m2", BetSignal::Yes).await.unwrap();

        let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let perf = store.performance(since).await.unwrap();
        assert_eq!(perf.len(), 2);
        assert_eq!(perf[0].symbol, "BTCUSDT");
        assert_eq!(perf[0].resolved, 2);
        assert_eq!(perf[0].wins, 1);
        assert!((perf[0].win_rate - 0.5).abs() < 1e-12);
        assert_eq!(perf[0].bettable_resolved, 1);
        assert_eq!(perf[0].bettable_wins, 1);
        assert_eq!(perf[1].symbol, "ETHUSDT");
        assert_eq!(perf[1].wins, 1);
    }
}
