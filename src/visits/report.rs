//! Travel and working time totals.

use serde::Serialize;
use tracing::instrument;

use crate::duration::{parse_timestamp, range_end, sum_durations, to_rfc3339};
use crate::error::{DurationError, Result};
use crate::store::{Condition, DocType, DocumentStore, Query};

/// Totals over a technician's punch records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PunchReport {
    pub total_travel_time: String,
    pub total_working_hours: String,
    pub travel_minutes: u64,
    pub working_minutes: u64,
    /// Punch records counted.
    pub records: usize,
}

/// Sum travel time and working hours for punch-ins within `[start, end]`.
///
/// A bare end date covers that whole day. Records with a missing or
/// malformed duration count as zero.
#[instrument(skip(store))]
pub fn punch_report(
    store: &dyn DocumentStore,
    technician: &str,
    start: &str,
    end: &str,
) -> Result<PunchReport> {
    let from = parse_timestamp(start)?;
    let to = range_end(end)?;
    if to < from {
        return Err(DurationError::EndBeforeStart {
            start: start.to_string(),
            end: end.to_string(),
        }
        .into());
    }

    let punches = store.list(
        DocType::Punch,
        &Query::new().eq("technician", technician).filter(
            "punch_in",
            Condition::Between(to_rfc3339(from).into(), to_rfc3339(to).into()),
        ),
    )?;

    let travel = sum_durations(punches.iter().map(|p| p.str("travel_time").unwrap_or_default()));
    let working =
        sum_durations(punches.iter().map(|p| p.str("working_hours").unwrap_or_default()));

    Ok(PunchReport {
        total_travel_time: travel.display,
        total_working_hours: working.display,
        travel_minutes: travel.minutes,
        working_minutes: working.minutes,
        records: punches.len(),
    })
}
