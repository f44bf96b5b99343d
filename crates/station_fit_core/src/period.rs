//! crates/station_fit_core/src/period.rs
//!
//! Period keys used as challenge and history document ids: ISO weeks as `YYYY-Www`
//! and calendar months as `YYYY-MM`.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;
use std::sync::OnceLock;

use crate::ports::{PortError, PortResult};

fn week_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{4})-W(\d{2})$").expect("valid week pattern"))
}

fn month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid month pattern"))
}

pub fn week_id(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

pub fn month_id(date: NaiveDate) -> String {
    format!("{}-{:02}", date.year(), date.month())
}

/// Monday and Sunday of an ISO week key.
pub fn week_bounds(week_id: &str) -> PortResult<(NaiveDate, NaiveDate)> {
    let invalid = || PortError::Invalid(format!("'{}' is not a week id (YYYY-Www)", week_id));
    let caps = week_pattern().captures(week_id).ok_or_else(invalid)?;
    let year: i32 = caps[1].parse().map_err(|_| invalid())?;
    let week: u32 = caps[2].parse().map_err(|_| invalid())?;
    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;
    Ok((monday, monday + Duration::days(6)))
}

/// First and last day of a month key.
pub fn month_bounds(month_id: &str) -> PortResult<(NaiveDate, NaiveDate)> {
    let first = parse_month(month_id)?;
    let next = next_month(first)?;
    Ok((first, next - Duration::days(1)))
}

fn parse_month(month_id: &str) -> PortResult<NaiveDate> {
    let invalid = || PortError::Invalid(format!("'{}' is not a month id (YYYY-MM)", month_id));
    let caps = month_pattern().captures(month_id).ok_or_else(invalid)?;
    let year: i32 = caps[1].parse().map_err(|_| invalid())?;
    let month: u32 = caps[2].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)
}

fn next_month(first: NaiveDate) -> PortResult<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| PortError::Invalid(format!("no month after {}", month_id(first))))
}

fn previous_month(first: NaiveDate) -> PortResult<NaiveDate> {
    let (year, month) = if first.month() == 1 {
        (first.year() - 1, 12)
    } else {
        (first.year(), first.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| PortError::Invalid(format!("no month before {}", month_id(first))))
}

pub fn validate_week_id(week_id: &str) -> PortResult<()> {
    week_bounds(week_id).map(|_| ())
}

pub fn validate_month_id(month_id: &str) -> PortResult<()> {
    parse_month(month_id).map(|_| ())
}

/// Longest window `months_back` will produce.
pub const MAX_LOOKBACK_MONTHS: usize = 60;

/// `count` month keys ending at `month_id`, most recent first.
pub fn months_back(month_id: &str, count: usize) -> PortResult<Vec<String>> {
    if count == 0 || count > MAX_LOOKBACK_MONTHS {
        return Err(PortError::Invalid(format!(
            "month count must be between 1 and {}, got {}",
            MAX_LOOKBACK_MONTHS, count
        )));
    }
    let mut cursor = parse_month(month_id)?;
    let mut keys = Vec::with_capacity(count);
    keys.push(self::month_id(cursor));
    for _ in 1..count {
        cursor = previous_month(cursor)?;
        keys.push(self::month_id(cursor));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn keys_for_dates() {
        assert_eq!(week_id(date(2024, 1, 31)), "2024-W05");
        // ISO week years differ from calendar years around new year.
        assert_eq!(week_id(date(2021, 1, 1)), "2020-W53");
        assert_eq!(month_id(date(2024, 3, 9)), "2024-03");
    }

    #[test]
    fn bounds() {
        assert_eq!(week_bounds("2024-W05").unwrap(), (date(2024, 1, 29), date(2024, 2, 4)));
        assert_eq!(month_bounds("2024-02").unwrap(), (date(2024, 2, 1), date(2024, 2, 29)));
        assert_eq!(month_bounds("2023-12").unwrap().1, date(2023, 12, 31));
        assert!(week_bounds("2024-5").is_err());
        assert!(validate_month_id("2024-13").is_err());
    }

    #[test]
    fn lookback_crosses_year_boundaries() {
        assert_eq!(months_back("2024-02", 3).unwrap(), vec!["2024-02", "2024-01", "2023-12"]);
    }

    #[test]
    fn lookback_window_is_bounded() {
        assert_eq!(months_back("2024-03", MAX_LOOKBACK_MONTHS).unwrap().len(), MAX_LOOKBACK_MONTHS);
        assert!(matches!(months_back("2024-03", 0), Err(PortError::Invalid(_))));
        assert!(matches!(months_back("2024-03", MAX_LOOKBACK_MONTHS + 1), Err(PortError::Invalid(_))));
        assert!(matches!(months_back("2024-03", 1usize << 60), Err(PortError::Invalid(_))));
    }

    #[test]
    fn stepping_past_the_calendar_ends_fails() {
        let first = NaiveDate::MIN.with_day(1).unwrap();
        assert!(previous_month(first).is_err());
        assert_eq!(previous_month(date(2024, 1, 1)).unwrap(), date(2023, 12, 1));
        let last = NaiveDate::MAX.with_day(1).unwrap();
        assert!(next_month(last).is_err());
        assert_eq!(next_month(date(2023, 12, 1)).unwrap(), date(2024, 1, 1));
    }
}
