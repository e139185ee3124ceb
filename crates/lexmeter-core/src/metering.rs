//! Metering windows for document-analysis usage.
//!
//! Usage is counted over half-open windows `[start, end)`:
//!
//! | Tier | Window |
//! |------|--------|
//! | free | calendar month to date |
//! | basic, pay-per-use | `max(plan start, month start)` .. next month start |
//! | premium | unmetered |

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::PlanTier;

/// A half-open interval over which documents are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteringWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl MeteringWindow {
    /// Whether `at` falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Midnight UTC on the first day of the month containing `now`.
#[must_use]
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = now.date_naive().with_day(1).unwrap_or_else(|| now.date_naive());
    midnight(first)
}

/// Midnight UTC on the first day of the month after the one containing `now`.
#[must_use]
pub fn start_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    midnight(NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// The window usage is counted over for `tier` at `now`.
///
/// `plan_started_at` is the start of whichever source granted the tier.
/// Returns `None` for unmetered tiers.
#[must_use]
pub fn metering_window(
    tier: PlanTier,
    plan_started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<MeteringWindow> {
    let month_start = start_of_month(now);
    let end = start_of_next_month(now);
    match tier {
        PlanTier::Premium => None,
        PlanTier::Free => Some(MeteringWindow {
            start: month_start,
            end,
        }),
        PlanTier::Basic | PlanTier::PayPerUse => Some(MeteringWindow {
            start: plan_started_at.max(month_start).min(end),
            end,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn month_boundaries() {
        assert_eq!(start_of_month(at(2026, 2, 17, 13)), at(2026, 2, 1, 0));
        assert_eq!(start_of_next_month(at(2026, 2, 17, 13)), at(2026, 3, 1, 0));
        assert_eq!(start_of_next_month(at(2026, 12, 31, 23)), at(2027, 1, 1, 0));
    }

    #[test]
    fn free_window_is_calendar_month() {
        let window = metering_window(PlanTier::Free, at(2025, 1, 1, 0), at(2026, 3, 9, 8)).unwrap();
        assert_eq!(window.start, at(2026, 3, 1, 0));
        assert_eq!(window.end, at(2026, 4, 1, 0));
    }

    #[test]
    fn basic_window_anchors_on_mid_month_start() {
        let started = at(2026, 3, 20, 10);

        let same_month = metering_window(PlanTier::Basic, started, at(2026, 3, 25, 0)).unwrap();
        assert_eq!(same_month.start, started);

        let next_month = metering_window(PlanTier::Basic, started, at(2026, 4, 5, 0)).unwrap();
        assert_eq!(next_month.start, at(2026, 4, 1, 0));
        assert_eq!(next_month.end, at(2026, 5, 1, 0));
    }

    #[test]
    fn pay_per_use_windows_like_basic() {
        let started = at(2026, 3, 20, 10);
        let window = metering_window(PlanTier::PayPerUse, started, at(2026, 3, 21, 0)).unwrap();
        assert_eq!(window.start, started);
    }

    #[test]
    fn premium_is_unmetered() {
        assert_eq!(
            metering_window(PlanTier::Premium, at(2026, 3, 1, 0), at(2026, 3, 2, 0)),
            None
        );
    }

    #[test]
    fn window_is_half_open() {
        let window = metering_window(PlanTier::Free, at(2026, 3, 1, 0), at(2026, 3, 2, 0)).unwrap();
        assert!(window.contains(at(2026, 3, 1, 0)));
        assert!(window.contains(at(2026, 4, 1, 0) - Duration::milliseconds(1)));
        assert!(!window.contains(at(2026, 4, 1, 0)));
    }
}
