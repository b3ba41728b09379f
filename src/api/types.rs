//! Request and response bodies.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GeoError, VisitError};
use crate::geo::{Coordinate, Degrees};
use crate::visits::{PunchAction, PunchRequest, VisitType};

/// Successful response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `"success"`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap data.
    pub fn ok(data: T) -> Self {
        Self {
            status: "success",
            message: None,
            data,
        }
    }

    /// Wrap data with a message.
    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: Some(message.into()),
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the service accepts traffic.
    pub ready: bool,
}

/// Optional position sent with a punch or a location report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Position {
    pub latitude: Option<Degrees>,
    pub longitude: Option<Degrees>,
}

impl Position {
    /// The coordinate, when sent. Sending only one half is an error.
    pub fn coordinate(&self) -> Result<Option<Coordinate>, GeoError> {
        let missing = |field| GeoError::InvalidNumber {
            field,
            value: String::new(),
        };
        match (&self.latitude, &self.longitude) {
            (Some(lat), Some(lon)) => Coordinate::from_degrees(lat, lon).map(Some),
            (Some(_), None) => Err(missing("longitude")),
            (None, Some(_)) => Err(missing("latitude")),
            (None, None) => Ok(None),
        }
    }
}

/// Body of `POST /visits/:name/punch`.
#[derive(Debug, Clone, Deserialize)]
pub struct PunchBody {
    /// `"in"` or `"out"`.
    #[serde(default)]
    pub action: String,
    /// `"First Visit"` (default) or `"Rescheduled Visit"`.
    #[serde(default)]
    pub visit_type: Option<String>,
    #[serde(flatten)]
    pub position: Position,
}

impl PunchBody {
    /// Validate into a punch request.
    pub fn into_request(self) -> crate::error::Result<PunchRequest> {
        let action = match self.action.trim().to_ascii_lowercase().as_str() {
            "in" => PunchAction::In,
            "out" => PunchAction::Out,
            other => {
                return Err(VisitError::InvalidOperation(format!(
                    "unknown punch action {other:?}, expected \"in\" or \"out\""
                ))
                .into())
            }
        };
        let visit_type = match self.visit_type.as_deref().map(str::trim) {
            None | Some("") => VisitType::default(),
            Some(name) => VisitType::from_str(name).map_err(|_| {
                VisitError::InvalidOperation(format!("unknown visit type {name:?}"))
            })?,
        };
        Ok(PunchRequest {
            action,
            visit_type,
            position: self.position.coordinate()?,
        })
    }
}

/// Body of `POST /visits/:name/notes`.
#[derive(Debug, Clone, Deserialize)]
pub struct NotesBody {
    pub note: String,
}

/// Body of the spare item and checklist updates.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusBody {
    pub status: crate::visits::YesNo,
}

/// Body of `POST /live-location`.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveLocationBody {
    pub latitude: Degrees,
    pub longitude: Degrees,
}

/// Query of `GET /geofence`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceQuery {
    pub lat1: String,
    pub lon1: String,
    pub lat2: String,
    pub lon2: String,
    /// Overrides the configured radius.
    pub radius: Option<f64>,
}

/// Query of `GET /reports/punch`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportQuery {
    pub start: String,
    pub end: String,
}

/// Query of `GET /installation-items`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressQuery {
    #[serde(default)]
    pub address: String,
}

/// A count returned by bulk maintenance operations.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

/// Upload result.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_url: String,
}
