//! Scheduled demo catalog.
//!
//! Lists one binary and one interval market per symbol on the venue's
//! cadence, with strikes set from the simulated feed's price at the open
//! and odds from a fixed crowd split.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::schedule::{binary_window, interval_window};
use super::MarketCatalog;
use crate::data::simulated::SimulatedFeed;
use crate::types::{ActiveMarket, EngineError, MarketKind, MarketOdds, MarketStatus};

pub struct ScheduledCatalog {
    feed: SimulatedFeed,
    /// Half-width of the interval MID band, as a fraction of price.
    band: f64,
}

impl ScheduledCatalog {
    pub fn new(feed: SimulatedFeed) -> Self {
        Self { feed, band: 0.004 }
    }

    fn round_price(value: f64) -> Result<Decimal, EngineError> {
        Decimal::from_f64(value)
            .map(|d| d.round_dp(if value >= 100.0 { 0 } else { 2 }))
            .ok_or_else(|| EngineError::Catalog(format!("unrepresentable price {value}")))
    }

    pub fn markets_at(&self, symbol: &str, now: DateTime<Utc>) -> Result<Vec<ActiveMarket>, EngineError> {
        let symbol = symbol.to_uppercase();
        let binary = binary_window(now);
        let interval = interval_window(now);

        let strike = Self::round_price(self.feed.price_at(&symbol, binary.open_at))?;
        let mid = self.feed.price_at(&symbol, interval.open_at);
        let lower = Self::round_price(mid * (1.0 - self.band))?;
        let upper = Self::round_price(mid * (1.0 + self.band))?;

        Ok(vec![
            ActiveMarket {
                market_id: format!("{symbol}-binary-{}", binary.resolve_at.format("%Y%m%d%H")),
                question: format!("Will {symbol} be above ${strike} at {}?", binary.resolve_at.format("%H:%M UTC")),
                symbol: symbol.clone(),
                kind: MarketKind::Binary { strike_price: strike },
                open_at: binary.open_at,
                close_at: binary.close_at,
                resolve_at: binary.resolve_at,
                status: MarketStatus::Open,
            },
            ActiveMarket {
                market_id: format!("{symbol}-interval-{}", interval.resolve_at.format("%Y%m%d%H")),
                question: format!("{symbol} price ${lower} - ${upper} at {}?", interval.resolve_at.format("%H:%M UTC")),
                symbol,
                kind: MarketKind::Interval { lower, upper },
                open_at: interval.open_at,
                close_at: interval.close_at,
                resolve_at: interval.resolve_at,
                status: MarketStatus::Open,
            },
        ])
    }
}

#[async_trait]
impl MarketCatalog for ScheduledCatalog {
    async fn list_active_markets(&self, symbol: &str) -> Result<Vec<ActiveMarket>, EngineError> {
        self.markets_at(symbol, Utc::now())
    }

    async fn market_odds(&self, market: &ActiveMarket) -> Result<Option<MarketOdds>, EngineError> {
        Ok(match market.kind {
            MarketKind::Binary { .. } => MarketOdds::from_binary_volumes(52.0, 48.0),
            MarketKind::Interval { .. } => MarketOdds::from_interval_volumes(30.0, 45.0, 25.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_markets_follow_schedule() {
        let catalog = ScheduledCatalog::new(SimulatedFeed::new());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        let markets = catalog.markets_at("btcusdt", now).unwrap();
        assert_eq!(markets.len(), 2);
        assert!(markets.iter().all(|m| m.symbol == "BTCUSDT"));
        assert!(markets.iter().all(|m| m.is_open_at(now)));
        assert_eq!(markets[0].resolve_at, Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap());
        match &markets[1].kind {
            MarketKind::Interval { lower, upper } => assert!(lower < upper),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_odds_match_kind() {
        let catalog = ScheduledCatalog::new(SimulatedFeed::new());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        let markets = catalog.markets_at("ETHUSDT", now).unwrap();
        let odds = tokio_test::block_on(catalog.market_odds(&markets[0])).unwrap();
        assert!(matches!(odds, Some(MarketOdds::Binary { .. })));
        let odds = tokio_test::block_on(catalog.market_odds(&markets[1])).unwrap();
        assert!(matches!(odds, Some(MarketOdds::Interval { .. })));
    }
}
