use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone};

/// This is the standard way of converting a date to a record file name.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Earliest valid instant of `day` in `tz`. A DST transition can skip or
/// double midnight; a skipped midnight moves the day start to the first
/// instant that exists.
pub fn day_start<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(&day.and_time(NaiveTime::MIN)) {
        LocalResult::Single(v) => v,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&day.and_hms_opt(1, 0, 0).expect("01:00 is a valid time"))
            .earliest()
            .expect("A day should start within an hour of midnight"),
    }
}

/// Returns start of the next calendar day. Computed in calendar space, so a
/// 23- or 25-hour day cannot shift the boundary off midnight.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    let next = date
        .date_naive()
        .succ_opt()
        .expect("End of time should never happen");
    day_start(next, &date.timezone())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Timelike, Utc};
    use chrono_tz::America::Sao_Paulo;
    use chrono_tz::Europe::Berlin;

    use super::{day_start, next_day_start};

    #[test]
    fn test_next_day_start_advances_one_calendar_day() {
        let date = Utc.with_ymd_and_hms(2018, 7, 4, 23, 30, 0).unwrap();
        let next = next_day_start(date);
        assert_eq!(next, Utc.with_ymd_and_hms(2018, 7, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_day_start_across_a_25_hour_day() {
        // Berlin falls back on 2025-10-26, making it a 25 hour day
        let date = Berlin.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap();
        let next = next_day_start(date);
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2025, 10, 27).unwrap());
        assert_eq!((next.hour(), next.minute()), (0, 0));
    }

    #[test]
    fn test_day_start_when_midnight_is_skipped() {
        // the 2017 DST start in Brazil jumped straight from 00:00 to 01:00
        let day = NaiveDate::from_ymd_opt(2017, 10, 15).unwrap();
        let start = day_start(day, &Sao_Paulo);
        assert_eq!(start.hour(), 1);
    }
}
