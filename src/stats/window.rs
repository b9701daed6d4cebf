use chrono::{DateTime, Datelike, Days, TimeZone, Utc};
use clap::ValueEnum;
use now::DateTimeNow;

use crate::utils::time::{day_start, next_day_start};

/// Coarse report window selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportRange {
    Day,
    Week,
    Year,
}

impl std::fmt::Display for ReportRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportRange::Day => write!(f, "day"),
            ReportRange::Week => write!(f, "week"),
            ReportRange::Year => write!(f, "year"),
        }
    }
}

/// Computes the half-open `[start, end)` window containing `anchor`.
/// Boundaries are derived in calendar space, so a week or day containing
/// a DST transition still starts and ends at local midnight and keeps all
/// its calendar days.
pub fn range_window<Tz: TimeZone>(
    range: ReportRange,
    anchor: DateTime<Tz>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = anchor.timezone();
    let (start, end) = match range {
        ReportRange::Day => (anchor.beginning_of_day(), next_day_start(anchor.clone())),
        ReportRange::Week => {
            let start = anchor.beginning_of_week();
            let end = day_start(start.date_naive() + Days::new(7), &tz);
            (start, end)
        }
        ReportRange::Year => {
            let start = anchor.beginning_of_year();
            let end = start
                .with_year(start.year() + 1)
                .expect("January 1st exists in every year");
            (start, end)
        }
    };
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Local, TimeZone, Timelike, Weekday};

    use super::{range_window, ReportRange};

    #[test]
    fn test_day_window_is_one_calendar_day() {
        let anchor = Local.with_ymd_and_hms(2018, 7, 4, 15, 30, 0).unwrap();
        let (start, end) = range_window(ReportRange::Day, anchor);

        let start = start.with_timezone(&Local);
        let end = end.with_timezone(&Local);
        assert_eq!((start.year(), start.month(), start.day()), (2018, 7, 4));
        assert_eq!((start.hour(), start.minute(), start.second()), (0, 0, 0));
        assert_eq!((end.year(), end.month(), end.day()), (2018, 7, 5));
        assert_eq!((end.hour(), end.minute()), (0, 0));
    }

    #[test]
    fn test_week_window_starts_on_week_start() {
        let anchor = Local.with_ymd_and_hms(2018, 7, 4, 15, 30, 0).unwrap();
        let (start, end) = range_window(ReportRange::Week, anchor);

        let start = start.with_timezone(&Local);
        let end = end.with_timezone(&Local);
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(end.weekday(), Weekday::Mon);
        assert_eq!((start.hour(), end.hour()), (0, 0));
        assert_eq!(end.date_naive() - start.date_naive(), chrono::Duration::days(7));
    }

    #[test]
    fn test_week_window_keeps_final_day_across_dst_fallback() {
        // Berlin falls back on Sunday 2025-10-26, stretching that week by an hour.
        let tz = chrono_tz::Europe::Berlin;
        let anchor = tz.with_ymd_and_hms(2025, 10, 22, 12, 0, 0).unwrap();
        let (start, end) = range_window(ReportRange::Week, anchor);

        let start = start.with_timezone(&tz);
        let end = end.with_timezone(&tz);
        assert_eq!((start.year(), start.month(), start.day()), (2025, 10, 20));
        assert_eq!((end.year(), end.month(), end.day()), (2025, 10, 27));
        assert_eq!(end.weekday(), Weekday::Mon);
        assert_eq!((end.hour(), end.minute()), (0, 0));
    }

    #[test]
    fn test_day_window_spans_25_hours_on_dst_fallback() {
        let tz = chrono_tz::Europe::Berlin;
        let anchor = tz.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap();
        let (start, end) = range_window(ReportRange::Day, anchor);

        assert_eq!(end - start, chrono::Duration::hours(25));
        let end = end.with_timezone(&tz);
        assert_eq!((end.year(), end.month(), end.day()), (2025, 10, 27));
        assert_eq!((end.hour(), end.minute()), (0, 0));
    }

    #[test]
    fn test_year_window_covers_calendar_year() {
        let anchor = Local.with_ymd_and_hms(2018, 7, 4, 15, 30, 0).unwrap();
        let (start, end) = range_window(ReportRange::Year, anchor);

        let start = start.with_timezone(&Local);
        let end = end.with_timezone(&Local);
        assert_eq!((start.year(), start.month(), start.day()), (2018, 1, 1));
        assert_eq!((end.year(), end.month(), end.day()), (2019, 1, 1));
    }
}
