//! Maintenance visit workflow.
//!
//! This module handles:
//! - Projecting visits for the mobile app
//! - Visit start and punch-in/out with geofencing
//! - Checklist, spare item, note and reschedule updates
//! - Image uploads
//! - Punch time reports

pub mod punch;
pub mod report;
pub mod updates;
pub mod uploads;
pub mod view;

pub use punch::{
    punch, start_visit, GeofencePolicy, PunchAction, PunchOutcome, PunchRequest, VisitStarted,
    VisitType, APPROVAL_PENDING,
};
pub use report::{punch_report, PunchReport};
pub use updates::{
    add_reschedule_request, approve_reschedule, record_live_location, set_technician_notes,
    update_checklist, update_spare_item, RescheduleRequest, YesNo,
};
pub use uploads::{add_attachment, add_symptom_requests, SymptomInput};
pub use view::{assigned_visits, group_by_item_code, visit_view, VisitView};
