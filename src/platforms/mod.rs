//! Market catalogs.
//!
//! Defines the `MarketCatalog` trait the decision engine discovers listed
//! markets and their crowd odds through, with the Unhedged REST client as
//! the production implementation and a scheduled catalog for demo runs.

pub mod schedule;
pub mod simulated;
pub mod unhedged;

use async_trait::async_trait;

use crate::types::{ActiveMarket, EngineError, MarketOdds};

/// Abstraction over prediction-market venues.
///
/// `list_active_markets` failures are fatal for the evaluation cycle that
/// asked; `market_odds` returning `Ok(None)` means the venue has no usable
/// odds yet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    /// Markets listed for `symbol`, in whatever status the venue reports.
    async fn list_active_markets(&self, symbol: &str) -> Result<Vec<ActiveMarket>, EngineError>;

    /// Current crowd odds for `market`.
    async fn market_odds(&self, market: &ActiveMarket) -> Result<Option<MarketOdds>, EngineError>;
}
