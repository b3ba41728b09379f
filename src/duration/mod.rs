//! Duration strings and stored timestamps.

pub mod text;
pub mod timestamp;

pub use text::{
    format_elapsed, minutes_to_duration, parse_duration_to_minutes, sum_durations, DurationTotal,
    ZERO_ELAPSED,
};
pub use timestamp::{parse_timestamp, range_end, to_rfc3339};
