//! Read-side projection of a technician's visit.
//!
//! Missing visit-start, task and punch data degrade to `""`. A broken
//! geolocation chain fails the whole read.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::error::{Result, ServiceError, StoreError, VisitError};
use crate::geo::{first_point, parse_geolocation, Coordinate};
use crate::store::{Condition, DocType, Document, DocumentStore, Query};

/// Fields the projection adds on top of the visit document.
const PROJECTED_FIELDS: [&str; 8] = [
    "visit_start",
    "start_time",
    "end_time",
    "latest_punch_in",
    "latest_punch_out",
    "geolocation",
    "checktree_description",
    "symptoms_table",
];

/// A visit as the mobile app sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitView {
    /// The visit document's own fields.
    #[serde(flatten)]
    pub visit: Map<String, Value>,
    /// Latest start of this visit by the technician.
    pub visit_start: String,
    /// Scheduled start of the latest pending task.
    pub start_time: String,
    /// Scheduled end of the latest pending task.
    pub end_time: String,
    /// Latest punch-in that has no punch-out yet.
    pub latest_punch_in: String,
    /// Latest recorded punch-out.
    pub latest_punch_out: String,
    /// Site location as stored on the installation address.
    pub geolocation: Value,
    /// Checklist rows grouped by item code.
    pub checktree_description: Map<String, Value>,
    /// Symptom rows grouped by item code.
    pub symptoms_table: Map<String, Value>,
}

fn text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

/// Regroup child rows into `item_code -> [rows]`.
///
/// Keys appear in first-seen order and rows keep their relative order.
pub fn group_by_item_code(rows: &[Value]) -> Map<String, Value> {
    let mut grouped = Map::new();
    for row in rows {
        let key = match row.get("item_code") {
            Some(Value::String(code)) => code.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        if let Value::Array(bucket) = grouped.entry(key).or_insert_with(|| json!([])) {
            bucket.push(row.clone());
        }
    }
    grouped
}

/// Follow visit → serial no → address → geolocation.
pub fn resolve_geolocation(store: &dyn DocumentStore, visit: &Document) -> Result<Value> {
    let delivery_address = visit.str("delivery_addres").unwrap_or_default();

    let address_name = store
        .get_value(
            DocType::SerialNo,
            Query::new().eq("custom_item_current_installation_address", delivery_address),
            "custom_item_current_installation_address_name",
        )?
        .and_then(|v| v.as_str().map(str::to_owned))
        .ok_or_else(|| VisitError::MissingSerialNo(delivery_address.to_string()))?;

    let address = match store.get(DocType::Address, &address_name) {
        Ok(address) => address,
        Err(StoreError::NotFound { .. }) => {
            return Err(VisitError::MissingAddress(address_name).into())
        }
        Err(e) => return Err(e.into()),
    };

    match address.get("geolocation") {
        Some(Value::Object(obj)) => Ok(Value::Object(obj.clone())),
        Some(Value::String(payload)) if !payload.is_empty() => parse_geolocation(payload)
            .map_err(|source| {
                ServiceError::from(VisitError::InvalidGeolocation {
                    address: address.name.clone(),
                    source,
                })
            }),
        _ => Err(VisitError::MissingGeolocation(address.name.clone()).into()),
    }
}

/// The customer site point for a visit, if its geolocation holds one.
pub fn site_coordinate(store: &dyn DocumentStore, visit: &Document) -> Result<Option<Coordinate>> {
    Ok(first_point(&resolve_geolocation(store, visit)?))
}

/// Project one visit for a technician.
#[instrument(skip(store, visit), fields(visit = %visit.name))]
pub fn project_visit(
    store: &dyn DocumentStore,
    technician: &str,
    visit: &Document,
) -> Result<VisitView> {
    let visit_start = store.get_value(
        DocType::VisitStart,
        Query::new()
            .eq("parent", visit.name.as_str())
            .eq("technician", technician)
            .latest_by("visit_start_at"),
        "visit_start_at",
    )?;

    let task = store.first(
        DocType::AssignedTask,
        Query::new()
            .eq("technician", technician)
            .eq("status", "Pending")
            .eq("issue_code", visit.name.as_str())
            .latest_by("creation"),
    )?;
    let (start_time, end_time) = match &task {
        Some(task) => (text(task.get("stime").cloned()), text(task.get("etime").cloned())),
        None => (String::new(), String::new()),
    };

    let punches = Query::new()
        .eq("parent", visit.name.as_str())
        .eq("technician", technician);
    let latest_punch_in = store.get_value(
        DocType::Punch,
        punches
            .clone()
            .is_set("punch_in")
            .not_set("punch_out")
            .latest_by("punch_in"),
        "punch_in",
    )?;
    let latest_punch_out = store.get_value(
        DocType::Punch,
        punches.is_set("punch_out").latest_by("punch_out"),
        "punch_out",
    )?;

    let geolocation = resolve_geolocation(store, visit)?;

    let mut fields = match visit.to_value() {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    for key in PROJECTED_FIELDS {
        fields.remove(key);
    }

    debug!(has_task = task.is_some(), "Projected visit");

    Ok(VisitView {
        checktree_description: group_by_item_code(visit.rows("checktree_description")),
        symptoms_table: group_by_item_code(visit.rows("symptoms_table")),
        visit: fields,
        visit_start: text(visit_start),
        start_time,
        end_time,
        latest_punch_in: text(latest_punch_in),
        latest_punch_out: text(latest_punch_out),
        geolocation,
    })
}

/// Project a visit by name.
pub fn visit_view(
    store: &dyn DocumentStore,
    technician: &str,
    visit_name: &str,
) -> Result<VisitView> {
    let visit = store.get(DocType::MaintenanceVisit, visit_name)?;
    project_visit(store, technician, &visit)
}

/// Every visit assigned to the technician, projected.
#[instrument(skip(store))]
pub fn assigned_visits(store: &dyn DocumentStore, technician: &str) -> Result<Vec<VisitView>> {
    store
        .list(
            DocType::MaintenanceVisit,
            &Query::new().filter("_assign", Condition::Contains(json!(technician))),
        )?
        .iter()
        .map(|visit| project_visit(store, technician, visit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    const TECH: &str = "tech@example.com";
    const SITE: &str = "1 Main St<br>Town<br>Country<br>";

    fn seeded() -> MemoryStore {
        MemoryStore::from_seed(json!({
            "Maintenance Visit": [{
                "name": "MV-1",
                "_assign": [TECH],
                "delivery_addres": SITE,
                "checktree_description": [
                    {"item_code": "PUMP", "work": "inspect"},
                    {"item_code": "FILTER", "work": "replace"},
                    {"item_code": "PUMP", "work": "grease"}
                ],
                "symptoms_table": []
            }],
            "Serial No": [{
                "name": "SN-1",
                "custom_item_current_installation_address": SITE,
                "custom_item_current_installation_address_name": "ADDR-1"
            }],
            "Address": [{
                "name": "ADDR-1",
                "geolocation": "{\"type\":\"FeatureCollection\",\"features\":[{\"type\":\"Feature\",\"properties\":{},\"geometry\":{\"type\":\"Point\",\"coordinates\":[105.85,21.03]}}]}"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn grouping_preserves_key_and_row_order() {
        let rows = vec![
            json!({"item_code": "B", "n": 1}),
            json!({"item_code": "A", "n": 2}),
            json!({"item_code": "B", "n": 3}),
        ];
        let grouped = group_by_item_code(&rows);
        let keys: Vec<_> = grouped.keys().cloned().collect();
        assert_eq!(keys, ["B", "A"]);
        assert_eq!(grouped["B"], json!([{"item_code": "B", "n": 1}, {"item_code": "B", "n": 3}]));
    }

    #[test]
    fn empty_projection_defaults_to_blank_strings() {
        let store = seeded();
        let view = visit_view(&store, TECH, "MV-1").unwrap();
        assert_eq!(view.visit_start, "");
        assert_eq!(view.start_time, "");
        assert_eq!(view.end_time, "");
        assert_eq!(view.latest_punch_in, "");
        assert_eq!(view.latest_punch_out, "");
        assert_eq!(view.geolocation["type"], "FeatureCollection");
        assert_eq!(view.checktree_description["PUMP"].as_array().unwrap().len(), 2);
        assert!(view.symptoms_table.is_empty());
    }

    #[test]
    fn projection_picks_latest_records() {
        let store = seeded();
        for (at, name) in [("2024-05-01T07:00:00Z", "VS-1"), ("2024-05-02T07:00:00Z", "VS-2")] {
            store
                .insert(
                    Document::named(DocType::VisitStart, name)
                        .with("parent", "MV-1")
                        .with("technician", TECH)
                        .with("visit_start_at", at),
                )
                .unwrap();
        }
        store
            .insert(
                Document::new(DocType::AssignedTask)
                    .with("technician", TECH)
                    .with("status", "Pending")
                    .with("issue_code", "MV-1")
                    .with("stime", "09:00:00")
                    .with("etime", "11:00:00")
                    .with("creation", "2024-05-01T00:00:00Z"),
            )
            .unwrap();
        store
            .insert(
                Document::new(DocType::Punch)
                    .with("parent", "MV-1")
                    .with("technician", TECH)
                    .with("punch_in", "2024-05-01T08:00:00Z")
                    .with("punch_out", "2024-05-01T09:00:00Z"),
            )
            .unwrap();
        store
            .insert(
                Document::new(DocType::Punch)
                    .with("parent", "MV-1")
                    .with("technician", TECH)
                    .with("punch_in", "2024-05-02T08:00:00Z"),
            )
            .unwrap();

        let view = visit_view(&store, TECH, "MV-1").unwrap();
        assert_eq!(view.visit_start, "2024-05-02T07:00:00Z");
        assert_eq!(view.start_time, "09:00:00");
        assert_eq!(view.end_time, "11:00:00");
        assert_eq!(view.latest_punch_in, "2024-05-02T08:00:00Z");
        assert_eq!(view.latest_punch_out, "2024-05-01T09:00:00Z");
    }

    #[test]
    fn other_technicians_records_are_ignored() {
        let store = seeded();
        store
            .insert(
                Document::new(DocType::VisitStart)
                    .with("parent", "MV-1")
                    .with("technician", "other@example.com")
                    .with("visit_start_at", "2024-05-01T07:00:00Z"),
            )
            .unwrap();
        let view = visit_view(&store, TECH, "MV-1").unwrap();
        assert_eq!(view.visit_start, "");
    }

    #[test]
    fn missing_serial_no_fails_the_read() {
        let store = seeded();
        let mut visit = store.get(DocType::MaintenanceVisit, "MV-1").unwrap();
        visit.set("delivery_addres", "elsewhere");
        store.update(&visit).unwrap();

        let err = visit_view(&store, TECH, "MV-1").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Visit(VisitError::MissingSerialNo(a)) if a == "elsewhere"
        ));
    }

    #[test]
    fn missing_or_broken_geolocation_fails_the_read() {
        let store = seeded();
        store
            .set_value(DocType::Address, "ADDR-1", "geolocation", Value::Null)
            .unwrap();
        assert!(matches!(
            visit_view(&store, TECH, "MV-1").unwrap_err(),
            ServiceError::Visit(VisitError::MissingGeolocation(_))
        ));

        store
            .set_value(DocType::Address, "ADDR-1", "geolocation", json!("{oops"))
            .unwrap();
        assert!(matches!(
            visit_view(&store, TECH, "MV-1").unwrap_err(),
            ServiceError::Visit(VisitError::InvalidGeolocation { .. })
        ));
    }

    #[test]
    fn site_coordinate_reads_first_point() {
        let store = seeded();
        let visit = store.get(DocType::MaintenanceVisit, "MV-1").unwrap();
        let site = site_coordinate(&store, &visit).unwrap().unwrap();
        assert_eq!((site.lat, site.lon), (21.03, 105.85));
    }

    #[test]
    fn assigned_visits_filters_by_technician() {
        let store = seeded();
        assert_eq!(assigned_visits(&store, TECH).unwrap().len(), 1);
        assert!(assigned_visits(&store, "nobody@example.com").unwrap().is_empty());
    }

    #[test]
    fn projection_does_not_duplicate_keys() {
        let store = seeded();
        let view = visit_view(&store, TECH, "MV-1").unwrap();
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["name"], "MV-1");
        assert!(value["checktree_description"].is_object());
    }
}
