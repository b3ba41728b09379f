//! HTTP API handlers.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{FromRequestParts, Multipart, Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use time::OffsetDateTime;
use tracing::debug;

use super::error::ApiError;
use super::types::*;
use crate::auth::{authenticate, Technician};
use crate::error::{AuthError, VisitError};
use crate::geo::{is_within_radius, Coordinate, GeofenceCheck};
use crate::serial::{self, InstallationItem, InstalledSerial, ItemTable};
use crate::store::{DocType, Document, DocumentStore, FileStore};
use crate::visits::{
    self, GeofencePolicy, PunchOutcome, PunchReport, RescheduleRequest, SymptomInput,
    VisitStarted, VisitView,
};

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Document persistence.
    pub store: Arc<dyn DocumentStore>,
    /// Upload storage.
    pub files: Arc<dyn FileStore>,
    /// Punch-in position rules.
    pub geofence: GeofencePolicy,
    /// Whether the service accepts traffic.
    pub ready: Arc<AtomicBool>,
    /// Prometheus render handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(store: Arc<dyn DocumentStore>, files: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            files,
            geofence: GeofencePolicy::default(),
            ready: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Use a geofence policy.
    pub fn with_geofence(mut self, geofence: GeofencePolicy) -> Self {
        self.geofence = geofence;
        self
    }

    /// Expose metrics through a Prometheus handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Technician {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().map_err(|_| AuthError::MalformedHeader))
            .transpose()?;
        Ok(authenticate(state.store(), header)?)
    }
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

/// Prometheus text exposition, or 404 when metrics are disabled.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Every visit assigned to the caller.
pub async fn list_visits(
    State(state): State<AppState>,
    tech: Technician,
) -> ApiResult<Vec<VisitView>> {
    let visits = visits::assigned_visits(state.store(), &tech.user)?;
    Ok(Json(ApiResponse::ok(visits)))
}

/// One visit as the caller sees it.
pub async fn get_visit(
    State(state): State<AppState>,
    tech: Technician,
    Path(name): Path<String>,
) -> ApiResult<VisitView> {
    let view = visits::visit_view(state.store(), &tech.user, &name)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Record that the caller has set off for a visit.
pub async fn start_visit(
    State(state): State<AppState>,
    tech: Technician,
    Path(name): Path<String>,
) -> ApiResult<VisitStarted> {
    let started = visits::start_visit(state.store(), &tech.user, &name, OffsetDateTime::now_utc())?;
    Ok(Json(ApiResponse::with_message(
        format!("Visit {name} started"),
        started,
    )))
}

/// Punch in or out.
pub async fn punch(
    State(state): State<AppState>,
    tech: Technician,
    Path(name): Path<String>,
    Json(body): Json<PunchBody>,
) -> ApiResult<PunchOutcome> {
    let request = body.into_request()?;
    let outcome = visits::punch(
        state.store(),
        &tech.user,
        &name,
        &request,
        state.geofence,
        OffsetDateTime::now_utc(),
    )?;
    Ok(Json(ApiResponse::with_message(outcome.message.clone(), outcome)))
}

/// Replace the visit's technician notes.
pub async fn set_notes(
    State(state): State<AppState>,
    _tech: Technician,
    Path(name): Path<String>,
    Json(body): Json<NotesBody>,
) -> ApiResult<()> {
    visits::set_technician_notes(state.store(), &name, &body.note)?;
    Ok(Json(ApiResponse::with_message(
        format!("Service tech notes updated for {name}"),
        (),
    )))
}

/// Multipart form split into text fields and file parts.
#[derive(Debug, Default)]
struct FormParts {
    text: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<FormParts, ApiError> {
    let mut form = FormParts::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let is_file = field.file_name().is_some() || name == "image" || name.ends_with("[image]");
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if is_file {
            form.files.insert(name, bytes.to_vec());
        } else {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|_| ApiError::BadRequest(format!("field {name} is not valid UTF-8")))?;
            form.text.insert(name, text);
        }
    }
    debug!(fields = form.text.len(), files = form.files.len(), "Read multipart form");
    Ok(form)
}

/// Run file-writing service work on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}

/// Upload an image attached to the visit.
pub async fn add_attachment(
    State(state): State<AppState>,
    _tech: Technician,
    Path(name): Path<String>,
    multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let mut form = read_multipart(multipart).await?;
    let bytes = form.files.remove("image").ok_or(VisitError::MissingImage)?;
    let (store, files) = (state.store.clone(), state.files.clone());
    let file_url = run_blocking(move || {
        visits::add_attachment(store.as_ref(), files.as_ref(), &name, &bytes)
    })
    .await?;
    Ok(Json(ApiResponse::with_message(
        "Image uploaded and records updated successfully",
        UploadResponse { file_url },
    )))
}

/// Symptoms sent as `symptoms[i][symptom_code]`, `symptoms[i][resolution]`
/// and an optional `symptoms[i][image]`, numbered from zero.
fn symptoms_from_form(form: &mut FormParts) -> Vec<SymptomInput> {
    let mut symptoms = Vec::new();
    for idx in 0.. {
        let code = form.text.remove(&format!("symptoms[{idx}][symptom_code]"));
        let resolution = form.text.remove(&format!("symptoms[{idx}][resolution]"));
        let (Some(symptom_code), Some(resolution)) = (code, resolution) else {
            break;
        };
        symptoms.push(SymptomInput {
            symptom_code,
            resolution,
            image: form.files.remove(&format!("symptoms[{idx}][image]")),
        });
    }
    symptoms
}

/// Record symptom requests for one item on the visit.
pub async fn add_symptoms(
    State(state): State<AppState>,
    _tech: Technician,
    Path(name): Path<String>,
    multipart: Multipart,
) -> ApiResult<Vec<String>> {
    let mut form = read_multipart(multipart).await?;
    let item_code = form
        .text
        .remove("item_code")
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::BadRequest("item_code is required".to_string()))?;
    let symptoms = symptoms_from_form(&mut form);

    let (store, files) = (state.store.clone(), state.files.clone());
    let created = run_blocking(move || {
        visits::add_symptom_requests(
            store.as_ref(),
            files.as_ref(),
            &name,
            &item_code,
            &symptoms,
        )
    })
    .await?;
    Ok(Json(ApiResponse::with_message(
        format!("{} symptom requests added", created.len()),
        created,
    )))
}

/// File a reschedule request.
pub async fn add_reschedule(
    State(state): State<AppState>,
    tech: Technician,
    Path(name): Path<String>,
    Json(body): Json<RescheduleRequest>,
) -> ApiResult<String> {
    let record = visits::add_reschedule_request(state.store(), &tech.user, &name, &body)?;
    Ok(Json(ApiResponse::with_message("Reschedule request added", record)))
}

/// Approve a reschedule request.
pub async fn approve_reschedule(
    State(state): State<AppState>,
    _tech: Technician,
    Path(request_name): Path<String>,
) -> ApiResult<()> {
    let request = state.store().get(DocType::RescheduleRequest, &request_name)?;
    let visit = request
        .str("maintenance_visit")
        .or_else(|| request.str("parent"))
        .ok_or_else(|| {
            VisitError::InvalidOperation(format!("request {request_name} has no visit"))
        })?;
    visits::approve_reschedule(state.store(), visit, &request_name)?;
    Ok(Json(ApiResponse::with_message("Reschedule approved", ())))
}

/// Mark a spare item collected.
pub async fn update_spare_item(
    State(state): State<AppState>,
    _tech: Technician,
    Path(name): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<()> {
    visits::update_spare_item(state.store(), &name, body.status)?;
    Ok(Json(ApiResponse::with_message("Spare item updated", ())))
}

/// Mark a checklist line done.
pub async fn update_checklist(
    State(state): State<AppState>,
    tech: Technician,
    Path(name): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<()> {
    visits::update_checklist(state.store(), &tech.user, &name, body.status)?;
    Ok(Json(ApiResponse::with_message("Checklist updated", ())))
}

/// Record the caller's position.
pub async fn live_location(
    State(state): State<AppState>,
    tech: Technician,
    Json(body): Json<LiveLocationBody>,
) -> ApiResult<String> {
    let position = Coordinate::from_degrees(&body.latitude, &body.longitude)?;
    let record = visits::record_live_location(
        state.store(),
        &tech.user,
        position,
        OffsetDateTime::now_utc(),
    )?;
    Ok(Json(ApiResponse::ok(record)))
}

/// Distance between two points and whether it is within the radius.
pub async fn geofence(
    State(state): State<AppState>,
    _tech: Technician,
    Query(query): Query<GeofenceQuery>,
) -> ApiResult<GeofenceCheck> {
    let a = Coordinate::parse(&query.lat1, &query.lon1)?;
    let b = Coordinate::parse(&query.lat2, &query.lon2)?;
    let radius = query.radius.unwrap_or(state.geofence.radius_m);
    if !radius.is_finite() || radius < 0.0 {
        return Err(ApiError::BadRequest(format!("invalid radius {radius}")));
    }
    let check = is_within_radius(a, b, radius);
    crate::metrics::record_geofence_check(check.within_radius);
    Ok(Json(ApiResponse::ok(check)))
}

/// Travel and working time totals for the caller.
pub async fn punch_report(
    State(state): State<AppState>,
    tech: Technician,
    Query(query): Query<ReportQuery>,
) -> ApiResult<PunchReport> {
    let report = visits::punch_report(state.store(), &tech.user, &query.start, &query.end)?;
    Ok(Json(ApiResponse::ok(report)))
}

/// Refresh installation addresses on serial numbers.
pub async fn refresh_addresses(
    State(state): State<AppState>,
    _tech: Technician,
) -> ApiResult<CountResponse> {
    let count = serial::refresh_installation_addresses(state.store())?;
    Ok(Json(ApiResponse::with_message(
        format!("{count} rows updated successfully."),
        CountResponse { count },
    )))
}

/// Create missing serial card history rows.
pub async fn populate_history(
    State(state): State<AppState>,
    _tech: Technician,
) -> ApiResult<CountResponse> {
    let count = serial::populate_serial_card_history(state.store())?;
    Ok(Json(ApiResponse::with_message(
        format!("{count} Serial No records updated successfully."),
        CountResponse { count },
    )))
}

/// Delete every serial card history row.
pub async fn clear_history(
    State(state): State<AppState>,
    _tech: Technician,
) -> ApiResult<CountResponse> {
    let count = serial::clear_serial_card_history(state.store())?;
    Ok(Json(ApiResponse::with_message(
        "All serial card history records deleted.",
        CountResponse { count },
    )))
}

/// Formatted addresses of a customer.
pub async fn customer_addresses(
    State(state): State<AppState>,
    _tech: Technician,
    Path(customer): Path<String>,
) -> ApiResult<Vec<String>> {
    let addresses = serial::customer_addresses(state.store(), &customer)?;
    Ok(Json(ApiResponse::ok(addresses)))
}

/// A customer's address records, with their names.
pub async fn customer_address_records(
    State(state): State<AppState>,
    _tech: Technician,
    Path(customer): Path<String>,
) -> ApiResult<Vec<serde_json::Map<String, serde_json::Value>>> {
    let records = serial::customer_address_records(state.store(), &customer)?;
    Ok(Json(ApiResponse::ok(records)))
}

/// Every serial installed at an address.
pub async fn serials_at_address(
    State(state): State<AppState>,
    _tech: Technician,
    Query(query): Query<AddressQuery>,
) -> ApiResult<Vec<InstalledSerial>> {
    let serials = serial::serials_at_address(state.store(), &query.address)?;
    Ok(Json(ApiResponse::ok(serials)))
}

/// The full item document.
pub async fn get_item(
    State(state): State<AppState>,
    _tech: Technician,
    Path(name): Path<String>,
) -> ApiResult<Document> {
    Ok(Json(ApiResponse::ok(serial::item(state.store(), &name)?)))
}

/// Item code of a visit's item line.
pub async fn visit_purpose_item_code(
    State(state): State<AppState>,
    _tech: Technician,
    Path(name): Path<String>,
) -> ApiResult<Option<String>> {
    let item_code = serial::visit_purpose_item_code(state.store(), &name)?;
    Ok(Json(ApiResponse::ok(item_code)))
}

/// Flagged items installed at an address.
pub async fn installation_items(
    State(state): State<AppState>,
    _tech: Technician,
    Query(query): Query<AddressQuery>,
) -> ApiResult<Vec<InstallationItem>> {
    let items = serial::installation_items(state.store(), &query.address)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// One of an item's child tables.
pub async fn item_table(
    State(state): State<AppState>,
    _tech: Technician,
    Path((item, table)): Path<(String, String)>,
) -> ApiResult<Vec<serde_json::Map<String, serde_json::Value>>> {
    let table = ItemTable::from_str(&table)
        .map_err(|_| ApiError::BadRequest(format!("unknown item table {table:?}")))?;
    let rows = serial::item_table(state.store(), &item, table)?;
    Ok(Json(ApiResponse::ok(rows)))
}
