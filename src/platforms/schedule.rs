//! Venue cadence.
//!
//! Binary markets run hourly: open at XX:05, close at XX:50, resolve at the
//! top of the next hour. Interval markets run two hours from each odd hour:
//! open at start + 5 min, close at :50 of the second hour, resolve when the
//! next odd hour begins.

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};

/// Open / close / resolve instants of one market cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketWindow {
    pub open_at: DateTime<Utc>,
    pub close_at: DateTime<Utc>,
    pub resolve_at: DateTime<Utc>,
}

impl MarketWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.open_at && now < self.close_at
    }
}

const OPEN_OFFSET_MINUTES: i64 = 5;
const CLOSE_MINUTE: i64 = 50;

fn hour_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::hours(1))
        .unwrap_or(now - Duration::seconds(i64::from(now.minute() * 60 + now.second())))
}

/// The hourly binary cycle whose hour contains `now`.
pub fn binary_window(now: DateTime<Utc>) -> MarketWindow {
    let start = hour_floor(now);
    MarketWindow {
        open_at: start + Duration::minutes(OPEN_OFFSET_MINUTES),
        close_at: start + Duration::minutes(CLOSE_MINUTE),
        resolve_at: start + Duration::hours(1),
    }
}

/// The two-hour interval cycle that started at the most recent odd hour.
pub fn interval_window(now: DateTime<Utc>) -> MarketWindow {
    let mut start = hour_floor(now);
    if start.hour() % 2 == 0 {
        start -= Duration::hours(1);
    }
    MarketWindow {
        open_at: start + Duration::minutes(OPEN_OFFSET_MINUTES),
        close_at: start + Duration::hours(1) + Duration::minutes(CLOSE_MINUTE),
        resolve_at: start + Duration::hours(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 17).unwrap()
    }

    #[test]
    fn test_binary_window() {
        let w = binary_window(at(14, 30));
        assert_eq!(w.open_at, Utc.with_ymd_and_hms(2026, 3, 1, 14, 5, 0).unwrap());
        assert_eq!(w.close_at, Utc.with_ymd_and_hms(2026, 3, 1, 14, 50, 0).unwrap());
        assert_eq!(w.resolve_at, Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap());
        assert!(w.contains(at(14, 30)));
        assert!(!binary_window(at(14, 2)).contains(at(14, 2)));
        assert!(!binary_window(at(14, 55)).contains(at(14, 55)));
    }

    #[test]
    fn test_interval_window_odd_and_even_hours() {
        let odd = interval_window(at(13, 40));
        let even = interval_window(at(14, 20));
        assert_eq!(odd, even);
        assert_eq!(odd.open_at, Utc.with_ymd_and_hms(2026, 3, 1, 13, 5, 0).unwrap());
        assert_eq!(odd.close_at, Utc.with_ymd_and_hms(2026, 3, 1, 14, 50, 0).unwrap());
        assert_eq!(odd.resolve_at, Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_interval_window_wraps_midnight() {
        let w = interval_window(Utc.with_ymd_and_hms(2026, 3, 2, 0, 30, 0).unwrap());
        assert_eq!(w.open_at, Utc.with_ymd_and_hms(2026, 3, 1, 23, 5, 0).unwrap());
        assert_eq!(w.resolve_at, Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap());
    }
}
