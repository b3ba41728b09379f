//! End-to-end tests through the HTTP router against an in-memory store.
//!
//! Run with: cargo test --test integration

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use field_service::api::{create_router, AppState};
use field_service::store::files::short_hash;
use field_service::store::{
    DocType, DocumentStore, LocalFileStore, MemoryFileStore, MemoryStore, Query,
};
use field_service::visits::GeofencePolicy;

const TECH: &str = "tech@example.com";
const SITE: &str = "12 Harbour Rd<br>Da Nang<br>Vietnam<br>";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const BOUNDARY: &str = "field-service-boundary";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    files: Arc<MemoryFileStore>,
}

fn seed() -> Value {
    json!({
        "User": [{"name": TECH, "api_key": "k1", "api_secret": "s1"}],
        "Maintenance Visit": [{
            "name": "MV-1",
            "_assign": format!("[\"{TECH}\"]"),
            "delivery_addres": SITE,
            "checktree_description": [
                {"item_code": "PUMP", "work": "inspect"},
                {"item_code": "PUMP", "work": "grease"}
            ]
        }],
        "Serial No": [{
            "name": "SN-1",
            "item_code": "PUMP",
            "item_name": "Pump",
            "customer": "ACME",
            "delivery_document_no": "DN-1",
            "custom_item_current_installation_address": SITE,
            "custom_item_current_installation_address_name": "ADDR-1"
        }],
        "Delivery Note": [{"name": "DN-1", "shipping_address_name": "ADDR-1"}],
        "Address": [{
            "name": "ADDR-1",
            "address_line1": "12 Harbour Rd",
            "town": "Da Nang",
            "country": "Vietnam",
            "geolocation": "{\"type\":\"FeatureCollection\",\"features\":[{\"type\":\"Feature\",\"properties\":{},\"geometry\":{\"type\":\"Point\",\"coordinates\":[0.0,0.0]}}]}",
            "links": [{"link_doctype": "Customer", "link_name": "ACME"}]
        }],
        "Item": [{"name": "PUMP", "custom_flag": "1"}]
    })
}

fn test_app(geofence: GeofencePolicy) -> TestApp {
    let store = Arc::new(MemoryStore::from_seed(seed()).unwrap());
    let files = Arc::new(MemoryFileStore::new());
    let state = AppState::new(store.clone(), files.clone()).with_geofence(geofence);
    TestApp {
        router: create_router(state),
        store,
        files,
    }
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, "token k1:s1");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Multipart body from text fields and (name, file name, bytes) files.
fn multipart(uri: &str, fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, "token k1:s1")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn visit_lifecycle() {
    let app = test_app(GeofencePolicy::default());

    let (status, body) = send(&app, request("GET", "/api/v1/visits", None)).await;
    assert_eq!(status, StatusCode::OK);
    let visits = body["data"].as_array().unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0]["name"], "MV-1");
    assert_eq!(visits[0]["visit_start"], "");
    assert_eq!(visits[0]["geolocation"]["type"], "FeatureCollection");
    assert_eq!(
        visits[0]["checktree_description"]["PUMP"].as_array().unwrap().len(),
        2
    );

    let (status, _) = send(
        &app,
        request("POST", "/api/v1/visits/MV-1/punch", Some(json!({"action": "in"}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app, request("POST", "/api/v1/visits/MV-1/start", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["visit_start"].as_str().unwrap().ends_with('Z'));

    let (status, body) = send(
        &app,
        request("POST", "/api/v1/visits/MV-1/punch", Some(json!({"action": "in"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["travel_time"], "0h 0m");

    let (status, body) = send(&app, request("GET", "/api/v1/visits/MV-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["latest_punch_in"], "");
    assert_eq!(body["data"]["latest_punch_out"], "");

    let (status, body) = send(
        &app,
        request("POST", "/api/v1/visits/MV-1/punch", Some(json!({"action": "out"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["working_hours"], "0h 0m");

    let (status, body) = send(
        &app,
        request("POST", "/api/v1/visits/MV-1/punch", Some(json!({"action": "out"}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");

    let visit = app.store.get(DocType::MaintenanceVisit, "MV-1").unwrap();
    assert_eq!(visit.str("completion_status"), Some("Approval Pending"));

    let (status, body) = send(
        &app,
        request("GET", "/api/v1/reports/punch?start=2000-01-01&end=2100-01-01", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["records"], 1);
    assert_eq!(body["data"]["total_working_hours"], "0m");
}

#[tokio::test]
async fn enforced_geofence_blocks_distant_punch_in() {
    let app = test_app(GeofencePolicy {
        radius_m: 300.0,
        enforce: true,
    });
    send(&app, request("POST", "/api/v1/visits/MV-1/start", None)).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/visits/MV-1/punch",
            Some(json!({"action": "in", "latitude": "0.005", "longitude": "0"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("from site"));

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/visits/MV-1/punch",
            Some(json!({"action": "in", "latitude": 0.0025, "longitude": 0})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["distance_m"].as_f64().unwrap() < 300.0);
}

#[tokio::test]
async fn uploads_attachments_and_symptoms() {
    let app = test_app(GeofencePolicy::default());

    let (status, body) = send(
        &app,
        multipart("/api/v1/visits/MV-1/attachments", &[], &[("image", "photo.png", PNG)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["data"]["file_url"].as_str().unwrap().to_string();
    assert!(url.ends_with(".png"));
    assert_eq!(app.files.get(&url).as_deref(), Some(PNG));

    let (status, _) = send(
        &app,
        multipart(
            "/api/v1/visits/MV-1/attachments",
            &[],
            &[("image", "notes.txt", &b"plain text"[..])],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        multipart(
            "/api/v1/visits/MV-1/symptoms",
            &[
                ("item_code", "PUMP"),
                ("symptoms[0][symptom_code]", "NOISE"),
                ("symptoms[0][resolution]", "Tighten mount"),
                ("symptoms[1][symptom_code]", "LEAK"),
                ("symptoms[1][resolution]", "Replace seal"),
            ],
            &[("symptoms[1][image]", "leak.png", PNG)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let rows = app
        .store
        .list(DocType::SymptomRequest, &Query::new().eq("parent", "MV-1"))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(!rows[0].is_set("image"));
    assert!(rows[1].str("image").unwrap().ends_with(".png"));
    assert_eq!(app.files.len(), 2);
}

#[tokio::test]
async fn reschedule_request_is_approved() {
    let app = test_app(GeofencePolicy::default());

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/visits/MV-1/reschedule",
            Some(json!({
                "type": "Parts Missing",
                "reason": "Seal on back order",
                "date": "2024-05-10",
                "hours": 2
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let request_name = body["data"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/v1/reschedule-requests/{request_name}/approve"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, request("GET", "/api/v1/visits", None)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let visit = app.store.get(DocType::MaintenanceVisit, "MV-1").unwrap();
    assert_eq!(visit.str("maintenance_type"), Some("Rescheduled"));
}

#[tokio::test]
async fn installation_address_maintenance() {
    let app = test_app(GeofencePolicy::default());

    let (status, body) = send(
        &app,
        request("POST", "/api/v1/serial-nos/refresh-addresses", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = send(&app, request("GET", "/api/v1/customers/ACME/addresses", None)).await;
    assert_eq!(body["data"], json!([SITE]));

    let (_, body) = send(
        &app,
        request(
            "GET",
            "/api/v1/installation-items?address=12%20Harbour%20Rd%3Cbr%3EDa%20Nang%3Cbr%3EVietnam%3Cbr%3E",
            None,
        ),
    )
    .await;
    assert_eq!(
        body["data"],
        json!([{"item_code": "PUMP", "label": "<b>Pump</b> | SN-1"}])
    );

    let (_, body) = send(&app, request("POST", "/api/v1/serial-card-history", None)).await;
    assert_eq!(body["data"]["count"], 1);
    let (_, body) = send(&app, request("DELETE", "/api/v1/serial-card-history", None)).await;
    assert_eq!(body["data"]["count"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attachment_is_written_to_the_files_dir() {
    let dir = std::env::temp_dir().join(format!("field-service-{}", short_hash()));
    let store = Arc::new(MemoryStore::from_seed(seed()).unwrap());
    let files = Arc::new(LocalFileStore::new(&dir, "/files"));
    let router = create_router(AppState::new(store.clone(), files));

    let response = router
        .oneshot(multipart(
            "/api/v1/visits/MV-1/attachments",
            &[],
            &[("image", "photo.png", PNG)],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    let url = body["data"]["file_url"].as_str().unwrap();
    let file_name = url.strip_prefix("/files/").unwrap();
    assert_eq!(std::fs::read(dir.join(file_name)).unwrap(), PNG);
    let record = store
        .first(DocType::File, Query::new().eq("file_url", url))
        .unwrap()
        .unwrap();
    assert_eq!(record.str("file_name"), Some(file_name));

    std::fs::remove_dir_all(&dir).ok();
}
