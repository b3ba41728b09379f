//! Stored geolocation payloads.
//!
//! Addresses keep their location as GeoJSON text, usually a
//! `FeatureCollection` with a single `Point` feature.

use serde_json::Value;

use super::distance::Coordinate;

/// Parse a stored geolocation payload into a JSON value.
pub fn parse_geolocation(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(text)
}

/// First `Point` found in a GeoJSON value.
///
/// Accepts a bare geometry, a `Feature` or a `FeatureCollection`.
/// GeoJSON positions are `[lon, lat]`.
pub fn first_point(value: &Value) -> Option<Coordinate> {
    match value.get("type")?.as_str()? {
        "Point" => {
            let coords = value.get("coordinates")?.as_array()?;
            let lon = coords.first()?.as_f64()?;
            let lat = coords.get(1)?.as_f64()?;
            Coordinate::new(lat, lon).ok()
        }
        "Feature" => first_point(value.get("geometry")?),
        "FeatureCollection" => value
            .get("features")?
            .as_array()?
            .iter()
            .find_map(first_point),
        _ => None,
    }
}
