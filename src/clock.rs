//! Calendar helpers: canonical day keys, week-start math, day windows.
//!
//! Stored dates are `YYYY-MM-DD` strings and instants are RFC 3339 strings;
//! everything here parses before comparing so mixed offsets never break
//! ordering.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc, Weekday};

/// Canonical `YYYY-MM-DD` key for an instant.
pub fn day_key(at: DateTime<Utc>) -> String {
    at.date_naive().format("%Y-%m-%d").to_string()
}

/// Today's canonical day key.
pub fn today_key() -> String {
    day_key(Utc::now())
}

/// Current instant, RFC 3339 with millisecond precision.
pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parses an RFC 3339 instant, normalizing to UTC.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The day key an instant falls on, None when it does not parse.
pub fn day_of(instant: &str) -> Option<String> {
    parse_instant(instant).map(day_key)
}

/// True when `instant` falls within `[date 00:00:00.000, date 23:59:59.999]`.
/// Unparseable input is never inside any window.
pub fn within_day(instant: &str, date: &str) -> bool {
    match (parse_instant(instant), parse_day(date)) {
        (Some(at), Some(day)) => at.date_naive() == day,
        _ => false,
    }
}

/// Lowercase English weekday name for a date ("monday".."sunday").
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// The most recent date on or before `date` whose weekday matches the
/// configured first day of the week. Unknown names fall back to Monday.
pub fn week_start(date: NaiveDate, week_starts_on: &str) -> NaiveDate {
    let first = weekday_from_name(week_starts_on).unwrap_or(Weekday::Mon);
    let offset = (7 + date.weekday().num_days_from_monday()
        - first.num_days_from_monday())
        % 7;
    date - chrono::Duration::days(i64::from(offset))
}

/// `week_start` over day-key strings; None when `date` does not parse.
pub fn week_start_key(date: &str, week_starts_on: &str) -> Option<String> {
    parse_day(date).map(|d| week_start(d, week_starts_on).format("%Y-%m-%d").to_string())
}

/// True when `schedule` (lowercase weekday names) includes the weekday of
/// `date`. An unparseable date matches nothing.
pub fn schedule_includes(schedule: &[String], date: &str) -> bool {
    let Some(day) = parse_day(date) else {
        return false;
    };
    let name = weekday_name(day);
    schedule.iter().any(|s| s.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_monday_convention() {
        // 2025-06-11 is a Wednesday
        let wed = parse_day("2025-06-11").unwrap();
        assert_eq!(week_start(wed, "monday"), parse_day("2025-06-09").unwrap());
        // A Monday is its own week start
        let mon = parse_day("2025-06-09").unwrap();
        assert_eq!(week_start(mon, "monday"), mon);
    }

    #[test]
    fn week_start_sunday_convention() {
        let wed = parse_day("2025-06-11").unwrap();
        assert_eq!(week_start(wed, "sunday"), parse_day("2025-06-08").unwrap());
        let sun = parse_day("2025-06-08").unwrap();
        assert_eq!(week_start(sun, "sunday"), sun);
    }

    #[test]
    fn week_start_crosses_year_boundary() {
        // 2025-01-01 is a Wednesday; Monday of that week is in 2024
        let d = parse_day("2025-01-01").unwrap();
        assert_eq!(week_start(d, "monday"), parse_day("2024-12-30").unwrap());
    }

    #[test]
    fn week_start_unknown_name_falls_back_to_monday() {
        let wed = parse_day("2025-06-11").unwrap();
        assert_eq!(week_start(wed, "caturday"), parse_day("2025-06-09").unwrap());
    }

    #[test]
    fn within_day_bounds() {
        assert!(within_day("2025-06-11T00:00:00.000Z", "2025-06-11"));
        assert!(within_day("2025-06-11T23:59:59.999Z", "2025-06-11"));
        assert!(!within_day("2025-06-12T00:00:00.000Z", "2025-06-11"));
        assert!(!within_day("not-a-time", "2025-06-11"));
    }

    #[test]
    fn within_day_normalizes_offsets() {
        // 01:30+02:00 is 23:30 UTC the previous day
        assert!(within_day("2025-06-12T01:30:00.000+02:00", "2025-06-11"));
        assert!(!within_day("2025-06-12T01:30:00.000+02:00", "2025-06-12"));
    }

    #[test]
    fn schedule_matching_is_case_insensitive() {
        let schedule = vec!["Wednesday".to_string(), "friday".to_string()];
        assert!(schedule_includes(&schedule, "2025-06-11")); // Wednesday
        assert!(!schedule_includes(&schedule, "2025-06-12")); // Thursday
        assert!(!schedule_includes(&schedule, "bogus"));
    }
}
