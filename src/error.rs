//! Unified error types for the field-service API.

use thiserror::Error;

use crate::store::DocType;

/// Unified error type for the service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Invalid coordinate input.
    #[error("geo error: {0}")]
    Geo(#[from] GeoError),

    /// Invalid duration input.
    #[error("duration error: {0}")]
    Duration(#[from] DurationError),

    /// Document or file store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Authentication failure.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Visit operation failure.
    #[error("visit error: {0}")]
    Visit(#[from] VisitError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Coordinate parsing and validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// Value is not a finite real number.
    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber {
        /// Which input was rejected.
        field: &'static str,
        /// The raw value.
        value: String,
    },

    /// Latitude outside [-90, 90].
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180].
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// Duration computation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationError {
    /// The end timestamp precedes the start timestamp.
    #[error("end {end} is before start {start}")]
    EndBeforeStart {
        /// Start timestamp (RFC 3339).
        start: String,
        /// End timestamp (RFC 3339).
        end: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// Document and file store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No document with that name.
    #[error("{doctype} {name:?} not found")]
    NotFound {
        /// Document kind.
        doctype: DocType,
        /// Document name.
        name: String,
    },

    /// Document rejected by the store.
    #[error("validation failed for {doctype}: {reason}")]
    Validation {
        /// Document kind.
        doctype: DocType,
        /// Reason for rejection.
        reason: String,
    },

    /// Unknown doctype in seed data.
    #[error("unknown doctype: {0}")]
    UnknownDocType(String),

    /// File store IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Seed data could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Authentication errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// No Authorization header.
    #[error("missing Authorization header")]
    MissingHeader,

    /// Header is not `token <key>:<secret>`.
    #[error("malformed Authorization header")]
    MalformedHeader,

    /// No user holds these credentials.
    #[error("invalid API key")]
    InvalidApiKey,
}

/// Visit operation errors.
#[derive(Error, Debug)]
pub enum VisitError {
    /// No Serial No is installed at the visit's delivery address.
    #[error("no Serial No found for address: {0}")]
    MissingSerialNo(String),

    /// The Serial No references an address that does not exist.
    #[error("address {0:?} not found")]
    MissingAddress(String),

    /// The address has no stored geolocation.
    #[error("no geolocation found for address: {0}")]
    MissingGeolocation(String),

    /// The stored geolocation is not valid JSON.
    #[error("invalid geolocation for address {address}: {source}")]
    InvalidGeolocation {
        /// Address name.
        address: String,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// Punch-in needs a prior visit start.
    #[error("visit start time not found for the technician")]
    VisitStartNotFound,

    /// Punch-out without an open punch-in.
    #[error("no active punch-in record found to update")]
    NoActivePunchIn,

    /// Request does not describe a valid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Uploaded bytes are not a recognised image.
    #[error("invalid image format")]
    InvalidImage,

    /// Multipart request carried no image.
    #[error("image file not found in the request")]
    MissingImage,

    /// Technician is too far from the customer site.
    #[error("technician is {distance_m:.0} m from site, limit is {radius_m:.0} m")]
    OutsideGeofence {
        /// Measured distance.
        distance_m: f64,
        /// Allowed radius.
        radius_m: f64,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, ServiceError>;
