//! HTTP API for technicians, plus health and metrics endpoints.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod types;

pub use error::{ApiError, ErrorResponse};
pub use handlers::AppState;
pub use routes::create_router;
