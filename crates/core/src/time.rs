//! Calendar helpers: local wall-clock ↔ UTC, day windows, day counts.
//!
//! Everything stored or compared is UTC. A local timezone only enters when a
//! human-facing wall-clock time ("00:30 in Asia/Shanghai", "yesterday") has to
//! be turned into UTC instants.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const SECONDS_PER_DAY: i64 = 86_400;

/// Longest forward search for the end of a DST gap (Samoa skipped a whole day).
const MAX_GAP_MINUTES: i64 = 25 * 60;

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if end <= start {
            return Err(DomainError::validation("window end must be after start"));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Resolve a local wall-clock date/time in `tz` to a UTC instant.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
/// Non-existent local times (DST spring-forward gap) resolve to the first
/// instant after the gap.
pub fn local_time_to_utc(tz: Tz, date: NaiveDate, time: NaiveTime) -> DomainResult<DateTime<Utc>> {
    let local = date.and_time(time);
    (0..=MAX_GAP_MINUTES)
        .find_map(|minutes| {
            tz.from_local_datetime(&(local + chrono::Duration::minutes(minutes)))
                .earliest()
        })
        .map(|resolved| resolved.with_timezone(&Utc))
        .ok_or_else(|| DomainError::validation(format!("{date} {time} does not exist in {tz}")))
}

/// Window covering the `lookback_days` local calendar days before the one
/// containing `now`: from local midnight `lookback_days` ago until local
/// midnight today.
///
/// `lookback_days = 1` is "yesterday".
pub fn day_window(tz: Tz, now: DateTime<Utc>, lookback_days: u32) -> DomainResult<DayWindow> {
    if lookback_days == 0 {
        return Err(DomainError::validation("lookback_days must be at least 1"));
    }

    let today = now.with_timezone(&tz).date_naive();
    let first_day = today
        .checked_sub_days(Days::new(u64::from(lookback_days)))
        .ok_or_else(|| DomainError::validation("lookback reaches before the calendar start"))?;

    let start = local_time_to_utc(tz, first_day, NaiveTime::default())?;
    let end = local_time_to_utc(tz, today, NaiveTime::default())?;
    DayWindow::new(start, end)
}

/// Whole days from `from` to `to`, rounded down (negative when `to < from`).
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};
    use proptest::prelude::*;

    fn shanghai() -> Tz {
        "Asia/Shanghai".parse().unwrap()
    }

    #[test]
    fn local_half_past_midnight_in_shanghai_is_previous_evening_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let time = NaiveTime::from_hms_opt(0, 30, 0).unwrap();

        let utc = local_time_to_utc(shanghai(), date, time).unwrap();

        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 5, 1, 16, 30, 0).unwrap());
    }

    #[test]
    fn spring_forward_gap_resolves_to_the_end_of_the_gap() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();

        // 02:30 does not exist; 03:00 EDT is 07:00 UTC.
        let utc = local_time_to_utc(tz, date, time).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn window_starting_on_a_missing_midnight_begins_after_the_gap() {
        // Santiago skips 2024-09-08 00:00-01:00 local.
        let tz: Tz = "America/Santiago".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 9, 9, 12, 0, 0).unwrap();

        let window = day_window(tz, now, 1).unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 9, 8, 4, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 9, 9, 3, 0, 0).unwrap());
    }

    #[test]
    fn previous_day_window_uses_local_midnights() {
        // 2024-05-02 00:30 local (UTC+8)
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 16, 30, 0).unwrap();

        let window = day_window(shanghai(), now, 1).unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 4, 30, 16, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 5, 1, 16, 0, 0).unwrap());
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
    }

    #[test]
    fn zero_lookback_is_rejected() {
        assert!(day_window(shanghai(), Utc::now(), 0).is_err());
    }

    #[test]
    fn elapsed_days_rounds_down() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(elapsed_days(start, start + Duration::hours(47)), 1);
        assert_eq!(elapsed_days(start, start + Duration::hours(48)), 2);
        assert_eq!(elapsed_days(start, start - Duration::hours(1)), -1);
    }

    proptest! {
        /// Property: in a zone without DST the window spans exactly
        /// `lookback` days and ends at or before `now`, less than a day earlier.
        #[test]
        fn window_spans_whole_days_and_ends_today(
            secs in 700_000_000i64..4_000_000_000i64,
            lookback in 1u32..30,
        ) {
            let now = DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
            let window = day_window(shanghai(), now, lookback).unwrap();

            prop_assert_eq!(window.end - window.start, Duration::days(i64::from(lookback)));
            prop_assert!(window.end <= now);
            prop_assert!(now - window.end < Duration::days(1));
            let local_end = window.end.with_timezone(&shanghai());
            prop_assert_eq!(local_end.hour(), 0);
            prop_assert_eq!(local_end.minute(), 0);
        }
    }
}
