//! Geofencing.
//!
//! This module handles:
//! - Coordinate parsing and range validation
//! - Haversine distance and radius checks
//! - Extracting the site point from stored GeoJSON

pub mod distance;
pub mod geojson;

pub use distance::{
    distance_meters, is_within_radius, Coordinate, Degrees, GeofenceCheck, DEFAULT_RADIUS_M,
};
pub use geojson::{first_point, parse_geolocation};
