//! Visit start and punch-in/out.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::view::site_coordinate;
use crate::duration::{format_elapsed, parse_timestamp, to_rfc3339};
use crate::error::{Result, VisitError};
use crate::geo::{is_within_radius, Coordinate, DEFAULT_RADIUS_M};
use crate::store::{DocType, Document, DocumentStore, Query};

/// Status a visit moves to once work is punched out.
pub const APPROVAL_PENDING: &str = "Approval Pending";

/// Kind of visit a punch record belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
pub enum VisitType {
    /// The first visit to the site.
    #[default]
    #[serde(rename = "First Visit")]
    #[strum(serialize = "First Visit")]
    FirstVisit,
    /// A follow-up after a reschedule.
    #[serde(rename = "Rescheduled Visit")]
    #[strum(serialize = "Rescheduled Visit")]
    RescheduledVisit,
}

/// Punch direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PunchAction {
    /// Start on-site work.
    In,
    /// Finish on-site work.
    Out,
}

/// How punch-in treats the technician's position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofencePolicy {
    /// Allowed distance from the site.
    pub radius_m: f64,
    /// Reject punch-in outside the radius or without a position.
    pub enforce: bool,
}

impl Default for GeofencePolicy {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
            enforce: false,
        }
    }
}

/// A punch request.
#[derive(Debug, Clone, PartialEq)]
pub struct PunchRequest {
    /// In or out.
    pub action: PunchAction,
    /// Which visit the record belongs to.
    pub visit_type: VisitType,
    /// Technician position, if the app sent one.
    pub position: Option<Coordinate>,
}

/// What a punch changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PunchOutcome {
    /// Punch record name.
    pub record: String,
    /// Human-readable summary.
    pub message: String,
    /// Travel time recorded at punch-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_time: Option<String>,
    /// Working hours recorded at punch-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_hours: Option<String>,
    /// Distance from the site, when a position was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

/// Result of starting a visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitStarted {
    /// Start record name.
    pub record: String,
    /// First start of the visit by anyone.
    pub visit_start: String,
}

/// Record that the technician has set off for a visit.
#[instrument(skip(store))]
pub fn start_visit(
    store: &dyn DocumentStore,
    technician: &str,
    visit_name: &str,
    now: OffsetDateTime,
) -> Result<VisitStarted> {
    let mut visit = store.get(DocType::MaintenanceVisit, visit_name)?;
    let started_at = to_rfc3339(now);

    let record = store.insert(
        Document::new(DocType::VisitStart)
            .with("parent", visit_name)
            .with("parenttype", DocType::MaintenanceVisit.to_string())
            .with("parentfield", "visit_start_records")
            .with("maintenance_visit", visit_name)
            .with("technician", technician)
            .with("visit_start_at", started_at.as_str()),
    )?;

    if !visit.is_set("visit_start") {
        visit.set("visit_start", started_at.as_str());
        store.update(&visit)?;
    }

    crate::metrics::inc_visit_starts();
    info!(record = %record.name, "Visit started");
    Ok(VisitStarted {
        record: record.name,
        visit_start: visit.str("visit_start").unwrap_or_default().to_string(),
    })
}

fn stored_time(doc: &Document, field: &str) -> Result<Option<OffsetDateTime>> {
    doc.str(field)
        .map(parse_timestamp)
        .transpose()
        .map_err(Into::into)
}

fn latest_visit_start(
    store: &dyn DocumentStore,
    technician: &str,
    visit_name: &str,
) -> Result<OffsetDateTime> {
    let record = store
        .first(
            DocType::VisitStart,
            Query::new()
                .eq("parent", visit_name)
                .eq("technician", technician)
                .latest_by("visit_start_at"),
        )?
        .ok_or(VisitError::VisitStartNotFound)?;
    stored_time(&record, "visit_start_at")?.ok_or_else(|| VisitError::VisitStartNotFound.into())
}

fn check_position(
    store: &dyn DocumentStore,
    visit: &Document,
    position: Option<Coordinate>,
    policy: GeofencePolicy,
) -> Result<Option<f64>> {
    let Some(position) = position else {
        if policy.enforce {
            return Err(VisitError::InvalidOperation(
                "punch-in requires the technician's position".to_string(),
            )
            .into());
        }
        return Ok(None);
    };

    let site = if policy.enforce {
        Some(
            site_coordinate(store, visit)?
                .ok_or_else(|| VisitError::MissingGeolocation(visit.name.clone()))?,
        )
    } else {
        // Reporting only: a visit without a usable site point is fine here.
        site_coordinate(store, visit).ok().flatten()
    };
    let Some(site) = site else {
        return Ok(None);
    };

    let check = is_within_radius(position, site, policy.radius_m);
    crate::metrics::record_geofence_check(check.within_radius);
    if !check.within_radius {
        if policy.enforce {
            return Err(VisitError::OutsideGeofence {
                distance_m: check.distance_m,
                radius_m: policy.radius_m,
            }
            .into());
        }
        warn!(distance_m = check.distance_m, "Punch-in outside geofence");
    }
    Ok(Some(check.distance_m))
}

/// Punch in or out of a visit.
///
/// A first-visit punch-in is refused while one is still open; rescheduled
/// visits may open several. Punch-out closes the latest open record of the
/// given type and moves the visit to [`APPROVAL_PENDING`].
#[instrument(skip(store, policy))]
pub fn punch(
    store: &dyn DocumentStore,
    technician: &str,
    visit_name: &str,
    request: &PunchRequest,
    policy: GeofencePolicy,
    now: OffsetDateTime,
) -> Result<PunchOutcome> {
    let visit = store.get(DocType::MaintenanceVisit, visit_name)?;

    let open_record = store.first(
        DocType::Punch,
        Query::new()
            .eq("parent", visit_name)
            .eq("technician", technician)
            .eq("type", request.visit_type.to_string())
            .not_set("punch_out")
            .latest_by("punch_in"),
    )?;

    match request.action {
        PunchAction::In => {
            if request.visit_type == VisitType::FirstVisit && open_record.is_some() {
                return Err(VisitError::InvalidOperation(
                    "first visit already punched in".to_string(),
                )
                .into());
            }

            let distance_m = check_position(store, &visit, request.position, policy)?;
            let started = latest_visit_start(store, technician, visit_name)?;
            let travel_time = format_elapsed(Some(started), Some(now))?;

            let mut doc = Document::new(DocType::Punch)
                .with("parent", visit_name)
                .with("parenttype", DocType::MaintenanceVisit.to_string())
                .with("parentfield", "punch_in_punch_out")
                .with("maintenance_visit", visit_name)
                .with("technician", technician)
                .with("punch_in", to_rfc3339(now))
                .with("travel_time", travel_time.as_str())
                .with("type", request.visit_type.to_string())
                .with("completed", "no");
            if let Some(distance) = distance_m {
                doc.set("distance_m", distance);
            }
            let record = store.insert(doc)?;

            crate::metrics::record_punch("in", &request.visit_type.to_string());
            info!(record = %record.name, travel_time = %travel_time, "Punched in");
            Ok(PunchOutcome {
                record: record.name,
                message: format!("Punch-in recorded for {}", request.visit_type),
                travel_time: Some(travel_time),
                working_hours: None,
                distance_m,
            })
        }
        PunchAction::Out => {
            let mut record = open_record.ok_or(VisitError::NoActivePunchIn)?;
            let punched_in = stored_time(&record, "punch_in")?;
            let working_hours = format_elapsed(punched_in, Some(now))?;

            record.set("punch_out", to_rfc3339(now));
            record.set("working_hours", working_hours.as_str());
            record.set("completed", "yes");
            store.update(&record)?;

            store.set_value(
                DocType::MaintenanceVisit,
                visit_name,
                "completion_status",
                APPROVAL_PENDING.into(),
            )?;

            crate::metrics::record_punch("out", &request.visit_type.to_string());
            info!(record = %record.name, working_hours = %working_hours, "Punched out");
            Ok(PunchOutcome {
                record: record.name,
                message: "Punch-out recorded and visit marked as Approval Pending".to_string(),
                travel_time: None,
                working_hours: Some(working_hours),
                distance_m: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::store::MemoryStore;
    use serde_json::json;
    use time::macros::datetime;

    const TECH: &str = "tech@example.com";
    const SITE: &str = "site-address";

    fn store() -> MemoryStore {
        MemoryStore::from_seed(json!({
            "Maintenance Visit": [{"name": "MV-1", "delivery_addres": SITE}],
            "Serial No": [{
                "name": "SN-1",
                "custom_item_current_installation_address": SITE,
                "custom_item_current_installation_address_name": "ADDR-1"
            }],
            "Address": [{
                "name": "ADDR-1",
                "geolocation": {"type": "Point", "coordinates": [0.0, 0.0]}
            }]
        }))
        .unwrap()
    }

    fn punch_in(visit_type: VisitType) -> PunchRequest {
        PunchRequest {
            action: PunchAction::In,
            visit_type,
            position: None,
        }
    }

    fn punch_out(visit_type: VisitType) -> PunchRequest {
        PunchRequest {
            action: PunchAction::Out,
            visit_type,
            position: None,
        }
    }

    #[test]
    fn start_visit_sets_first_start_only() {
        let store = store();
        let first = start_visit(&store, TECH, "MV-1", datetime!(2024-05-01 07:00 UTC)).unwrap();
        let second = start_visit(&store, TECH, "MV-1", datetime!(2024-05-01 08:00 UTC)).unwrap();
        assert_eq!(first.visit_start, "2024-05-01T07:00:00Z");
        assert_eq!(second.visit_start, "2024-05-01T07:00:00Z");
        assert_ne!(first.record, second.record);
    }

    #[test]
    fn start_visit_requires_existing_visit() {
        let store = store();
        let err = start_visit(&store, TECH, "MV-404", datetime!(2024-05-01 07:00 UTC)).unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
    }

    #[test]
    fn punch_in_needs_visit_start() {
        let store = store();
        let err = punch(
            &store,
            TECH,
            "MV-1",
            &punch_in(VisitType::FirstVisit),
            GeofencePolicy::default(),
            datetime!(2024-05-01 08:00 UTC),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Visit(VisitError::VisitStartNotFound)));
    }

    #[test]
    fn full_first_visit_cycle() {
        let store = store();
        let policy = GeofencePolicy::default();
        start_visit(&store, TECH, "MV-1", datetime!(2024-05-01 07:00 UTC)).unwrap();

        let inn = punch(
            &store,
            TECH,
            "MV-1",
            &punch_in(VisitType::FirstVisit),
            policy,
            datetime!(2024-05-01 07:45:30 UTC),
        )
        .unwrap();
        assert_eq!(inn.travel_time.as_deref(), Some("0h 45m"));

        let again = punch(
            &store,
            TECH,
            "MV-1",
            &punch_in(VisitType::FirstVisit),
            policy,
            datetime!(2024-05-01 07:50 UTC),
        );
        assert!(matches!(
            again,
            Err(ServiceError::Visit(VisitError::InvalidOperation(_)))
        ));

        let out = punch(
            &store,
            TECH,
            "MV-1",
            &punch_out(VisitType::FirstVisit),
            policy,
            datetime!(2024-05-01 10:00 UTC),
        )
        .unwrap();
        assert_eq!(out.record, inn.record);
        assert_eq!(out.working_hours.as_deref(), Some("2h 14m"));

        let record = store.get(DocType::Punch, &out.record).unwrap();
        assert_eq!(record.str("completed"), Some("yes"));
        assert_eq!(record.str("punch_out"), Some("2024-05-01T10:00:00Z"));
        let visit = store.get(DocType::MaintenanceVisit, "MV-1").unwrap();
        assert_eq!(visit.str("completion_status"), Some(APPROVAL_PENDING));
    }

    #[test]
    fn punch_out_without_open_record_fails() {
        let store = store();
        let err = punch(
            &store,
            TECH,
            "MV-1",
            &punch_out(VisitType::FirstVisit),
            GeofencePolicy::default(),
            datetime!(2024-05-01 10:00 UTC),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Visit(VisitError::NoActivePunchIn)));
    }

    #[test]
    fn rescheduled_visits_may_open_several_records() {
        let store = store();
        let policy = GeofencePolicy::default();
        start_visit(&store, TECH, "MV-1", datetime!(2024-05-01 07:00 UTC)).unwrap();
        for minute in [10, 20] {
            punch(
                &store,
                TECH,
                "MV-1",
                &punch_in(VisitType::RescheduledVisit),
                policy,
                datetime!(2024-05-01 08:00 UTC) + time::Duration::minutes(minute),
            )
            .unwrap();
        }
        let open = store
            .list(DocType::Punch, &Query::new().not_set("punch_out"))
            .unwrap();
        assert_eq!(open.len(), 2);
    }

    #[test]
    fn enforced_geofence_rejects_distant_or_missing_position() {
        let store = store();
        let policy = GeofencePolicy {
            radius_m: 300.0,
            enforce: true,
        };
        start_visit(&store, TECH, "MV-1", datetime!(2024-05-01 07:00 UTC)).unwrap();

        let far = PunchRequest {
            position: Some(Coordinate::new(0.005, 0.0).unwrap()),
            ..punch_in(VisitType::FirstVisit)
        };
        let err = punch(&store, TECH, "MV-1", &far, policy, datetime!(2024-05-01 08:00 UTC))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Visit(VisitError::OutsideGeofence { .. })));

        let err = punch(
            &store,
            TECH,
            "MV-1",
            &punch_in(VisitType::FirstVisit),
            policy,
            datetime!(2024-05-01 08:00 UTC),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Visit(VisitError::InvalidOperation(_))));

        let near = PunchRequest {
            position: Some(Coordinate::new(0.0025, 0.0).unwrap()),
            ..punch_in(VisitType::FirstVisit)
        };
        let ok = punch(&store, TECH, "MV-1", &near, policy, datetime!(2024-05-01 08:00 UTC))
            .unwrap();
        assert!(ok.distance_m.unwrap() < 300.0);
    }

    #[test]
    fn visit_type_uses_display_names() {
        assert_eq!(VisitType::RescheduledVisit.to_string(), "Rescheduled Visit");
        let parsed: VisitType = serde_json::from_value(json!("First Visit")).unwrap();
        assert_eq!(parsed, VisitType::FirstVisit);
    }
}
