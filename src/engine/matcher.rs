//! Market matcher.
//!
//! Picks the one listed market a symbol's decision should be attached to:
//! open right now, soonest to resolve. Finding nothing is an ordinary
//! outcome ("nothing to bet on this cycle"), not an error.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{ActiveMarket, MarketStatus};

/// Select the open market for `symbol` with the soonest `resolve_at`.
///
/// Discards markets for other symbols, markets whose `open_at` is still in
/// the future, and markets already closed or resolved at `now`. Ties on
/// `resolve_at` go to the earlier `close_at`, then the lower market id.
pub fn select_market<'a>(
    symbol: &str,
    now: DateTime<Utc>,
    markets: &'a [ActiveMarket],
) -> Option<&'a ActiveMarket> {
    let candidates = markets.iter().filter(|m| {
        if !m.symbol.eq_ignore_ascii_case(symbol) {
            return false;
        }
        match m.status_at(now) {
            MarketStatus::Open => true,
            status => {
                debug!(market_id = %m.market_id, %status, "Market discarded");
                false
            }
        }
    });

    let selected = candidates.min_by(|a, b| {
        a.resolve_at
            .cmp(&b.resolve_at)
            .then(a.close_at.cmp(&b.close_at))
            .then_with(|| a.market_id.cmp(&b.market_id))
    });

    match selected {
        Some(m) => debug!(symbol, market_id = %m.market_id, resolve_at = %m.resolve_at, "Market matched"),
        None => debug!(symbol, listed = markets.len(), "No open market"),
    }
    selected
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
