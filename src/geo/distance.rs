//! Great-circle distance and radius checks.

use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Radius used to confirm a technician is at the customer site.
pub const DEFAULT_RADIUS_M: f64 = 300.0;

/// A degree value as sent by clients: either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Degrees {
    /// Numeric form.
    Number(f64),
    /// Textual form, parsed on use.
    Text(String),
}

impl Degrees {
    /// Parse into an `f64`, naming the field on failure.
    pub fn to_f64(&self, field: &'static str) -> Result<f64, GeoError> {
        let value = match self {
            Degrees::Number(v) => *v,
            Degrees::Text(s) => s.trim().parse::<f64>().map_err(|_| GeoError::InvalidNumber {
                field,
                value: s.clone(),
            })?,
        };

        if !value.is_finite() {
            return Err(GeoError::InvalidNumber {
                field,
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}

impl From<f64> for Degrees {
    fn from(value: f64) -> Self {
        Degrees::Number(value)
    }
}

impl From<&str> for Degrees {
    fn from(value: &str) -> Self {
        Degrees::Text(value.to_string())
    }
}

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    /// Latitude in [-90, 90].
    pub lat: f64,
    /// Longitude in [-180, 180].
    pub lon: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() {
            return Err(GeoError::InvalidNumber {
                field: "lat",
                value: lat.to_string(),
            });
        }
        if !lon.is_finite() {
            return Err(GeoError::InvalidNumber {
                field: "lon",
                value: lon.to_string(),
            });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::LongitudeOutOfRange(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Build a coordinate from client-supplied degree values.
    pub fn from_degrees(lat: &Degrees, lon: &Degrees) -> Result<Self, GeoError> {
        Self::new(lat.to_f64("lat")?, lon.to_f64("lon")?)
    }

    /// Build a coordinate from two strings.
    pub fn parse(lat: &str, lon: &str) -> Result<Self, GeoError> {
        Self::from_degrees(&Degrees::from(lat), &Degrees::from(lon))
    }
}

/// Result of a radius check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeofenceCheck {
    /// Great-circle distance in meters.
    pub distance_m: f64,
    /// Whether `distance_m <= radius`.
    pub within_radius: bool,
}

/// Haversine distance between two coordinates, in meters.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    // Clamp guards sqrt(1 - h) against rounding just above 1.
    let h = ((d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Distance between two coordinates and whether it is within `radius_m`.
pub fn is_within_radius(a: Coordinate, b: Coordinate, radius_m: f64) -> GeofenceCheck {
    let distance_m = distance_meters(a, b);
    GeofenceCheck {
        distance_m,
        within_radius: distance_m <= radius_m,
    }
}
