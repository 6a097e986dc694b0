//! Calendar period helpers: YYYY-MM-DD dates, Monday-start weeks, YYYY-MM months.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::error::AppError;

pub const DATE_FMT: &str = "%Y-%m-%d";

/// Parse a YYYY-MM-DD string.
pub fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .map_err(|_| AppError::InvalidArgument(format!("invalid date: {}", s)))
}

/// Today's date string for the given instant.
pub fn date_str(at: DateTime<Utc>) -> String {
    at.date_naive().format(DATE_FMT).to_string()
}

/// Yesterday's date string for the given instant.
pub fn yesterday_str(at: DateTime<Utc>) -> String {
    (at.date_naive() - Duration::days(1))
        .format(DATE_FMT)
        .to_string()
}

/// (week_start, week_end) date strings for the Monday-start week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (String, String) {
    let days_from_monday = date.weekday().num_days_from_monday() as i64;
    let start = date - Duration::days(days_from_monday);
    let end = start + Duration::days(6);
    (
        start.format(DATE_FMT).to_string(),
        end.format(DATE_FMT).to_string(),
    )
}

/// (first_day, last_day) date strings for a YYYY-MM month key.
pub fn month_bounds(month: &str) -> Result<(String, String), AppError> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", month), DATE_FMT)
        .map_err(|_| AppError::InvalidArgument(format!("invalid month: {}", month)))?;

    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .ok_or_else(|| AppError::Internal(format!("month arithmetic failed for {}", month)))?;

    let last = next_month - Duration::days(1);
    Ok((
        first.format(DATE_FMT).to_string(),
        last.format(DATE_FMT).to_string(),
    ))
}

/// YYYY-MM key for the month containing `date`.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// YYYY-MM key for the month before the one containing `date`.
pub fn previous_month_key(date: NaiveDate) -> String {
    let first_of_month = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
    let last_of_prev = first_of_month - Duration::days(1);
    month_key(last_of_prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_bounds_monday_start() {
        // 2025-06-04 is a Wednesday
        let d = parse_date("2025-06-04").unwrap();
        assert_eq!(
            week_bounds(d),
            ("2025-06-02".to_string(), "2025-06-08".to_string())
        );

        // A Monday maps to itself
        let monday = parse_date("2025-06-02").unwrap();
        assert_eq!(
            week_bounds(monday),
            ("2025-06-02".to_string(), "2025-06-08".to_string())
        );

        // A Sunday belongs to the week that started the previous Monday
        let sunday = parse_date("2025-06-08").unwrap();
        assert_eq!(
            week_bounds(sunday),
            ("2025-06-02".to_string(), "2025-06-08".to_string())
        );
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(
            month_bounds("2025-06").unwrap(),
            ("2025-06-01".to_string(), "2025-06-30".to_string())
        );
        assert_eq!(
            month_bounds("2025-02").unwrap(),
            ("2025-02-01".to_string(), "2025-02-28".to_string())
        );
        // December crosses the year boundary
        assert_eq!(
            month_bounds("2025-12").unwrap(),
            ("2025-12-01".to_string(), "2025-12-31".to_string())
        );
        assert!(month_bounds("garbage").is_err());
    }

    #[test]
    fn test_previous_month_key() {
        let d = parse_date("2025-06-15").unwrap();
        assert_eq!(previous_month_key(d), "2025-05");

        // January rolls back into the previous year
        let jan = parse_date("2025-01-01").unwrap();
        assert_eq!(previous_month_key(jan), "2024-12");
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert!(parse_date("2025-13-40").is_err());
        assert!(parse_date("not-a-date").is_err());
    }
}
