use geo::{BoundingRect, Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Minimum number of positions of a closed ring (triangle + closing vertex)
pub const MIN_RING_POINTS: usize = 4;

/// Raw geometry payload as drawn by the user
/// Same shape as a GeoJSON geometry object: `{"type": "...", "coordinates": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: serde_json::Value,
}

impl RawGeometry {
    pub fn new(kind: impl Into<String>, coordinates: serde_json::Value) -> Self {
        RawGeometry {
            kind: kind.into(),
            coordinates,
        }
    }

    /// Single-ring polygon from (lon, lat) positions, taken as given (no closing added)
    pub fn polygon(ring: &[(f64, f64)]) -> Self {
        let positions: Vec<serde_json::Value> = ring
            .iter()
            .map(|(lon, lat)| serde_json::json!([lon, lat]))
            .collect();
        RawGeometry::new("Polygon", serde_json::json!([positions]))
    }

    /// Parse a GeoJSON geometry object
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| AnalysisError::InvalidGeometry(format!("malformed geometry payload: {e}")))
    }
}

impl TryFrom<&geojson::Geometry> for RawGeometry {
    type Error = AnalysisError;

    fn try_from(geometry: &geojson::Geometry) -> Result<Self> {
        let value = serde_json::to_value(geometry)
            .map_err(|e| AnalysisError::InvalidGeometry(format!("unserializable geometry: {e}")))?;
        serde_json::from_value(value)
            .map_err(|e| AnalysisError::InvalidGeometry(format!("malformed geometry payload: {e}")))
    }
}

impl From<&FieldGeometry> for RawGeometry {
    fn from(geometry: &FieldGeometry) -> Self {
        RawGeometry::polygon(&geometry.vertices())
    }
}

/// A validated field boundary: one closed ring in WGS84 degrees (x = longitude, y = latitude)
///
/// Only [`validate`] builds one, so every instance holds the ring invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGeometry {
    polygon: Polygon<f64>,
}

impl FieldGeometry {
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn exterior(&self) -> &LineString<f64> {
        self.polygon.exterior()
    }

    /// Ring vertices as (lon, lat), closing vertex included
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        self.polygon.exterior().coords().map(|c| (c.x, c.y)).collect()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        // A validated ring always has at least four finite vertices
        match self.polygon.bounding_rect() {
            Some(rect) => BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            None => BoundingBox::new(0.0, 0.0, 0.0, 0.0),
        }
    }
}

/// Check a raw payload and turn it into a [`FieldGeometry`]
///
/// Order of checks: geometry type, coordinate shape, ring count, ring size and
/// closure, then WGS84 bounds of every vertex.
pub fn validate(raw: &RawGeometry) -> Result<FieldGeometry> {
    if raw.kind != "Polygon" {
        return Err(AnalysisError::UnsupportedGeometryType(raw.kind.clone()));
    }

    let rings: Vec<Vec<Vec<f64>>> = serde_json::from_value(raw.coordinates.clone())
        .map_err(|e| AnalysisError::InvalidGeometry(format!("malformed polygon coordinates: {e}")))?;

    let ring = match rings.as_slice() {
        [] => return Err(AnalysisError::InvalidGeometry("polygon has no ring".into())),
        [ring] => ring,
        _ => {
            return Err(AnalysisError::InvalidGeometry(format!(
                "polygon has {} rings, holes are not supported",
                rings.len()
            )))
        }
    };

    let mut coords = Vec::with_capacity(ring.len());
    for position in ring {
        if position.len() < 2 {
            return Err(AnalysisError::InvalidGeometry(format!(
                "position with {} ordinates",
                position.len()
            )));
        }
        // Altitude, if any, is ignored
        let (lon, lat) = (position[0], position[1]);
        if !lon.is_finite() || !lat.is_finite() {
            return Err(AnalysisError::InvalidGeometry(
                "non-finite coordinate".into(),
            ));
        }
        coords.push(Coord { x: lon, y: lat });
    }

    if coords.len() < MIN_RING_POINTS {
        return Err(AnalysisError::InvalidGeometry(format!(
            "ring has {} points, at least {} required",
            coords.len(),
            MIN_RING_POINTS
        )));
    }
    if coords.first() != coords.last() {
        return Err(AnalysisError::InvalidGeometry("ring is not closed".into()));
    }

    for c in &coords {
        if !(MIN_LON..=MAX_LON).contains(&c.x) || !(MIN_LAT..=MAX_LAT).contains(&c.y) {
            return Err(AnalysisError::OutOfCrsBounds { lon: c.x, lat: c.y });
        }
    }

    Ok(FieldGeometry {
        polygon: Polygon::new(LineString::new(coords), vec![]),
    })
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// STAC / GeoJSON order: [min_lon, min_lat, max_lon, max_lat]
    pub fn to_stac_bbox(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}
