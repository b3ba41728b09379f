//! Mapping service errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{ServiceError, StoreError, VisitError};

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `"error"`.
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A failure from the service layer.
    Service(ServiceError),
    /// The request itself could not be read.
    BadRequest(String),
}

impl<E> From<E> for ApiError
where
    E: Into<ServiceError>,
{
    fn from(err: E) -> Self {
        ApiError::Service(err.into())
    }
}

/// HTTP status for a service error.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Geo(_) | ServiceError::Duration(_) => StatusCode::BAD_REQUEST,
        ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
        ServiceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        ServiceError::Store(StoreError::Validation { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Visit(visit) => match visit {
            VisitError::MissingSerialNo(_)
            | VisitError::MissingAddress(_)
            | VisitError::MissingGeolocation(_) => StatusCode::NOT_FOUND,
            VisitError::InvalidImage | VisitError::MissingImage => StatusCode::BAD_REQUEST,
            VisitError::VisitStartNotFound
            | VisitError::NoActivePunchIn
            | VisitError::InvalidOperation(_)
            | VisitError::OutsideGeofence { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VisitError::InvalidGeolocation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ServiceError::Store(_)
        | ServiceError::Config(_)
        | ServiceError::Json(_)
        | ServiceError::Io(_)
        | ServiceError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Service(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!(error = %err, "Request failed");
                } else {
                    warn!(error = %err, status = status.as_u16(), "Request rejected");
                }
                (status, err.to_string())
            }
            ApiError::BadRequest(message) => {
                warn!(%message, "Bad request");
                (StatusCode::BAD_REQUEST, message)
            }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
