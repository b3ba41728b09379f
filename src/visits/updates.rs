//! Small field updates and request records submitted from the app.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::duration::to_rfc3339;
use crate::error::Result;
use crate::geo::Coordinate;
use crate::store::{DocType, Document, DocumentStore};

/// Yes/no answer sent by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    /// Affirmative.
    Yes,
    /// Anything else.
    #[serde(other)]
    No,
}

impl YesNo {
    /// Lowercase wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            YesNo::Yes => "yes",
            YesNo::No => "no",
        }
    }
}

/// Mark a spare item as collected or not.
#[instrument(skip(store))]
pub fn update_spare_item(store: &dyn DocumentStore, name: &str, status: YesNo) -> Result<()> {
    let mut item = store.get(DocType::SpareItem, name)?;
    item.set("collected", status.as_str());
    store.update(&item)?;
    info!("Spare item updated");
    Ok(())
}

/// Mark a checklist line as done by the technician, or undo it.
#[instrument(skip(store))]
pub fn update_checklist(
    store: &dyn DocumentStore,
    technician: &str,
    name: &str,
    status: YesNo,
) -> Result<()> {
    let mut line = store.get(DocType::Checklist, name)?;
    match status {
        YesNo::Yes => {
            line.set("work_done", "Yes");
            line.set("done_by", technician);
        }
        YesNo::No => {
            line.set("work_done", "No");
            line.set("done_by", Value::Null);
        }
    }
    store.update(&line)?;
    info!("Checklist updated");
    Ok(())
}

/// Replace the technician notes on a visit.
#[instrument(skip(store, note))]
pub fn set_technician_notes(store: &dyn DocumentStore, visit_name: &str, note: &str) -> Result<()> {
    store.set_value(
        DocType::MaintenanceVisit,
        visit_name,
        "service_tech_notes",
        note.into(),
    )?;
    Ok(())
}

/// Store a technician position report.
#[instrument(skip(store))]
pub fn record_live_location(
    store: &dyn DocumentStore,
    technician: &str,
    position: Coordinate,
    now: OffsetDateTime,
) -> Result<String> {
    let record = store.insert(
        Document::new(DocType::LiveLocation)
            .with("latitude", position.lat)
            .with("longitude", position.lon)
            .with("technician", technician)
            .with("time", to_rfc3339(now)),
    )?;
    Ok(record.name)
}

/// A request to move a visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    /// Request category.
    #[serde(rename = "type")]
    pub kind: String,
    /// Why the visit must move.
    pub reason: String,
    /// Proposed date.
    pub date: String,
    /// Estimated hours still needed.
    pub hours: Value,
}

/// File a reschedule request against a visit.
#[instrument(skip(store, request))]
pub fn add_reschedule_request(
    store: &dyn DocumentStore,
    technician: &str,
    visit_name: &str,
    request: &RescheduleRequest,
) -> Result<String> {
    store.get(DocType::MaintenanceVisit, visit_name)?;
    let record = store.insert(
        Document::new(DocType::RescheduleRequest)
            .with("type", request.kind.as_str())
            .with("reason", request.reason.as_str())
            .with("technician", technician)
            .with("date", request.date.as_str())
            .with("hours", request.hours.clone())
            .with("maintenance_visit", visit_name)
            .with("parent", visit_name)
            .with("parenttype", DocType::MaintenanceVisit.to_string())
            .with("parentfield", "reschedule_requests"),
    )?;
    info!(record = %record.name, "Reschedule request filed");
    Ok(record.name)
}

/// Approve a reschedule: unassign the visit and mark it rescheduled.
#[instrument(skip(store))]
pub fn approve_reschedule(
    store: &dyn DocumentStore,
    visit_name: &str,
    request_name: &str,
) -> Result<()> {
    let mut request = store.get(DocType::RescheduleRequest, request_name)?;
    let mut visit = store.get(DocType::MaintenanceVisit, visit_name)?;

    visit.set("_assign", json!([]));
    visit.set("maintenance_type", "Rescheduled");
    store.update(&visit)?;

    request.set("approval", "Approved");
    request.set("approval_status", "1");
    store.update(&request)?;

    info!("Reschedule approved");
    Ok(())
}
