//! Timestamp encoding for stored documents.
//!
//! Documents hold timestamps as RFC 3339 text in UTC, truncated to whole
//! seconds. Reads also accept the `YYYY-MM-DD HH:MM:SS` form and bare dates.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::error::DurationError;

/// Truncate to whole seconds in UTC.
pub fn truncate_to_seconds(ts: OffsetDateTime) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(ts.unix_timestamp()).unwrap_or(ts)
}

/// Encode a timestamp for storage.
pub fn to_rfc3339(ts: OffsetDateTime) -> String {
    let ts = truncate_to_seconds(ts);
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

/// Decode a stored timestamp.
pub fn parse_timestamp(text: &str) -> Result<OffsetDateTime, DurationError> {
    let text = text.trim();
    if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(ts);
    }

    let naive = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(ts) = PrimitiveDateTime::parse(text, naive) {
        return Ok(ts.assume_utc());
    }

    parse_date(text).map(|d| d.midnight().assume_utc())
}

/// Decode a bare `YYYY-MM-DD` date.
pub fn parse_date(text: &str) -> Result<Date, DurationError> {
    let date_only = format_description!("[year]-[month]-[day]");
    Date::parse(text.trim(), date_only)
        .map_err(|_| DurationError::InvalidTimestamp(text.to_string()))
}

/// Inclusive upper bound for a range end: a bare date covers the whole day.
pub fn range_end(text: &str) -> Result<OffsetDateTime, DurationError> {
    if let Ok(date) = parse_date(text) {
        let end_of_day = Time::from_hms(23, 59, 59)
            .map_err(|_| DurationError::InvalidTimestamp(text.to_string()))?;
        return Ok(date.with_time(end_of_day).assume_utc());
    }
    parse_timestamp(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn encodes_utc_whole_seconds() {
        let ts = datetime!(2024-05-01 08:00:00.750 +02:00);
        assert_eq!(to_rfc3339(ts), "2024-05-01T06:00:00Z");
    }

    #[test]
    fn decodes_all_accepted_forms() {
        let expected = datetime!(2024-05-01 06:00:00 UTC);
        assert_eq!(parse_timestamp("2024-05-01T06:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-01T08:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-05-01 06:00:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-05-01").unwrap(),
            datetime!(2024-05-01 00:00:00 UTC)
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn range_end_covers_whole_day() {
        assert_eq!(
            range_end("2024-05-31").unwrap(),
            datetime!(2024-05-31 23:59:59 UTC)
        );
        assert_eq!(
            range_end("2024-05-31T12:00:00Z").unwrap(),
            datetime!(2024-05-31 12:00:00 UTC)
        );
    }
}
