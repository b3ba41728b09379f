//! HTTP API route definitions.

use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers::*;
use crate::metrics::LatencyTimer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

async fn track_latency(path: Option<MatchedPath>, request: Request, next: Next) -> Response {
    let endpoint = path.as_ref().map(MatchedPath::as_str).unwrap_or("unmatched");
    let mut timer = LatencyTimer::new(endpoint);
    let response = next.run(request).await;
    timer.set_status(response.status().as_u16());
    response
}

/// Authenticated technician API.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/visits", get(list_visits))
        .route("/visits/:name", get(get_visit))
        .route("/visits/:name/start", post(start_visit))
        .route("/visits/:name/punch", post(punch))
        .route("/visits/:name/notes", post(set_notes))
        .route("/visits/:name/attachments", post(add_attachment))
        .route("/visits/:name/symptoms", post(add_symptoms))
        .route("/visits/:name/reschedule", post(add_reschedule))
        .route("/reschedule-requests/:name/approve", post(approve_reschedule))
        .route("/spare-items/:name", post(update_spare_item))
        .route("/checklist/:name", post(update_checklist))
        .route("/live-location", post(live_location))
        .route("/geofence", get(geofence))
        .route("/reports/punch", get(punch_report))
        .route("/serial-nos/refresh-addresses", post(refresh_addresses))
        .route(
            "/serial-card-history",
            post(populate_history).delete(clear_history),
        )
        .route("/customers/:customer/addresses", get(customer_addresses))
        .route(
            "/customers/:customer/address-records",
            get(customer_address_records),
        )
        .route("/installation-items", get(installation_items))
        .route("/installed-serials", get(serials_at_address))
        .route("/items/:name", get(get_item))
        .route("/items/:name/:table", get(item_table))
        .route(
            "/visit-purposes/:name/item-code",
            get(visit_purpose_item_code),
        )
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .nest("/api/v1", api_routes())
        .route_layer(middleware::from_fn(track_latency))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
