use crate::error::{CoreError, Result};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Minimum lead time between "now" and a sliding expiry boundary.
pub const MIN_SLIDING_LEAD_DAYS: i64 = 30;

/// Parse an RFC3339 timestamp, rejecting anything else.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| {
        CoreError::invalid_date_time(format!("failed to parse '{value}' as RFC3339: {e}"))
    })
}

pub fn format_rfc3339(value: OffsetDateTime) -> Result<String> {
    Ok(value.to_offset(UtcOffset::UTC).format(&Rfc3339)?)
}

/// Parse either a full RFC3339 timestamp or a date-only `YYYY-MM-DD` value.
fn parse_instant_or_date(value: &str) -> Option<OffsetDateTime> {
    if let Ok(dt) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(dt);
    }
    let date = Date::parse(value, format_description!("[year]-[month]-[day]")).ok()?;
    Some(PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc())
}

/// True when both values denote the same instant, or the same calendar day
/// when either side is date-only.
pub fn same_instant_or_date(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (Some(left), Some(right)) = (parse_instant_or_date(a), parse_instant_or_date(b)) else {
        return false;
    };
    let date_only = a.len() == 10 || b.len() == 10;
    if date_only {
        left.to_offset(UtcOffset::UTC).date() == right.to_offset(UtcOffset::UTC).date()
    } else {
        left == right
    }
}

fn quarter_start(year: i32, quarter: u8) -> Result<OffsetDateTime> {
    let year = year + i32::from(quarter / 4);
    let month = Month::try_from((quarter % 4) * 3 + 1)?;
    let date = Date::from_calendar_date(year, month, 1)?;
    Ok(PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc())
}

/// Start of the next calendar quarter (UTC) that is at least
/// [`MIN_SLIDING_LEAD_DAYS`] away from `now`.
pub fn sliding_expires_on(now: OffsetDateTime) -> Result<OffsetDateTime> {
    let now = now.to_offset(UtcOffset::UTC);
    let current_quarter = (u8::from(now.month()) - 1) / 3;
    let mut boundary = quarter_start(now.year(), current_quarter + 1)?;
    if boundary - now < Duration::days(MIN_SLIDING_LEAD_DAYS) {
        boundary = quarter_start(now.year(), current_quarter + 2)?;
    }
    Ok(boundary)
}

/// [`sliding_expires_on`] rendered as RFC3339.
pub fn sliding_expires_on_rfc3339(now: OffsetDateTime) -> Result<String> {
    format_rfc3339(sliding_expires_on(now)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sliding_expiry_rolls_to_next_quarter() {
        let out = sliding_expires_on_rfc3339(datetime!(1975-10-28 12:00:00 UTC)).unwrap();
        assert_eq!(out, "1976-01-01T00:00:00Z");
    }

    #[test]
    fn test_sliding_expiry_skips_close_boundary() {
        let out = sliding_expires_on(datetime!(1975-12-15 00:00:00 UTC)).unwrap();
        assert_eq!(out, datetime!(1976-04-01 00:00:00 UTC));
    }

    #[test]
    fn test_sliding_expiry_exactly_thirty_days_is_kept() {
        let out = sliding_expires_on(datetime!(2024-03-02 00:00:00 UTC)).unwrap();
        assert_eq!(out, datetime!(2024-04-01 00:00:00 UTC));
    }

    #[test]
    fn test_sliding_expiry_uses_utc() {
        // 2023-12-31 23:00 -02:00 is already 2024-01-01 in UTC
        let out = sliding_expires_on(datetime!(2023-12-31 23:00:00 -2)).unwrap();
        assert_eq!(out, datetime!(2024-04-01 00:00:00 UTC));
    }

    #[test]
    fn test_sliding_expiry_is_monotonic_and_far_enough() {
        let mut t = datetime!(2020-01-01 00:00:00 UTC);
        let mut previous = sliding_expires_on(t).unwrap();
        for _ in 0..(4 * 365) {
            t += Duration::hours(6);
            let next = sliding_expires_on(t).unwrap();
            assert!(next >= previous, "{next} < {previous} at {t}");
            assert!(next - t >= Duration::days(MIN_SLIDING_LEAD_DAYS));
            previous = next;
        }
    }

    #[test]
    fn test_parse_rfc3339_rejects_garbage() {
        assert!(parse_rfc3339("2023-05-15T14:30:00Z").is_ok());
        assert!(parse_rfc3339("15/05/2023").is_err());
        assert!(parse_rfc3339("2006-01-02T15:04:05Z07:00").is_err());
    }

    #[test]
    fn test_same_instant_or_date() {
        assert!(same_instant_or_date(
            "2023-05-15T14:30:00Z",
            "2023-05-15T16:30:00+02:00"
        ));
        assert!(same_instant_or_date("2023-05-15", "2023-05-15T10:00:00Z"));
        assert!(!same_instant_or_date("2023-05-15", "2023-05-16T00:00:00Z"));
        assert!(!same_instant_or_date("garbage", "2023-05-16"));
    }
}
