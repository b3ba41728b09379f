//! `"Hh Mm"` duration strings.
//!
//! Two renderings exist and are kept apart on purpose:
//! [`format_elapsed`] always writes the hour segment (`"0h 5m"`), while
//! [`minutes_to_duration`] drops it when zero (`"5m"`). Stored punch
//! records use the first, reports use the second.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use time::OffsetDateTime;

use super::timestamp::to_rfc3339;
use crate::error::DurationError;

/// Elapsed-form rendering used when either timestamp is missing.
pub const ZERO_ELAPSED: &str = "0h 0m";

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(\d+)h)?\s*(?:(\d+)m)?").expect("duration pattern compiles"));

/// Render the span between two timestamps as `"{h}h {m}m"`.
///
/// Seconds are truncated. A missing timestamp yields [`ZERO_ELAPSED`];
/// an end before the start is rejected.
pub fn format_elapsed(
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
) -> Result<String, DurationError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(ZERO_ELAPSED.to_string());
    };

    if end < start {
        return Err(DurationError::EndBeforeStart {
            start: to_rfc3339(start),
            end: to_rfc3339(end),
        });
    }

    let total_seconds = (end - start).whole_seconds();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    Ok(format!("{hours}h {minutes}m"))
}

/// Parse `"2h 15m"`, `"45m"` or `"3h"` into total minutes.
///
/// Parsing is lenient: text that does not start with the pattern, or whose
/// numbers overflow, counts as zero. Aggregates over historical records
/// rely on this to stay total.
pub fn parse_duration_to_minutes(text: &str) -> u64 {
    let Some(caps) = DURATION_RE.captures(text.trim()) else {
        return 0;
    };

    let group = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    match (group(1), group(2)) {
        (Some(hours), Some(minutes)) => hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(minutes))
            .unwrap_or(0),
        _ => 0,
    }
}

/// Render a minute count, omitting the hour segment when it is zero.
pub fn minutes_to_duration(total_minutes: u64) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours == 0 {
        format!("{minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}

/// Sum of several duration strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DurationTotal {
    /// Total in minutes.
    pub minutes: u64,
    /// Total rendered with [`minutes_to_duration`].
    pub display: String,
}

/// Parse each entry, sum, and render once. Malformed entries add zero.
pub fn sum_durations<I, S>(entries: I) -> DurationTotal
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let minutes = entries
        .into_iter()
        .map(|e| parse_duration_to_minutes(e.as_ref()))
        .fold(0u64, u64::saturating_add);

    DurationTotal {
        minutes,
        display: minutes_to_duration(minutes),
    }
}
