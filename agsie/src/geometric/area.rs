use geo::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{Area, Coord, GeodesicArea, Line};
use serde::{Deserialize, Serialize};

use crate::commons::basic_functions::square_meters_to_hectares;
use crate::error::{AnalysisError, Result};
use crate::geo_core::FieldGeometry;

/// Square degrees to hectares, the flat-earth scaling of older field records.
/// Only close to reality for very small fields at mid latitudes.
pub const LEGACY_DEG2_TO_HECTARES: f64 = 12365.0;

/// How an area was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaMethod {
    /// Karney's geodesic polygon area on the WGS84 ellipsoid
    Geodesic,
    /// Shoelace area in square degrees times [`LEGACY_DEG2_TO_HECTARES`]
    LegacyPlanar,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaMeasurement {
    pub hectares: f64,
    pub method: AreaMethod,
}

/// Ground area of a validated field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaCalculator {
    method: AreaMethod,
}

impl Default for AreaCalculator {
    fn default() -> Self {
        AreaCalculator::geodesic()
    }
}

impl AreaCalculator {
    pub fn geodesic() -> Self {
        AreaCalculator {
            method: AreaMethod::Geodesic,
        }
    }

    /// Planar mode kept to reproduce areas stored by older records
    pub fn legacy_planar() -> Self {
        AreaCalculator {
            method: AreaMethod::LegacyPlanar,
        }
    }

    pub fn method(&self) -> AreaMethod {
        self.method
    }

    /// Area in hectares. Rings that self-intersect or enclose nothing are refused.
    pub fn compute(&self, geometry: &FieldGeometry) -> Result<AreaMeasurement> {
        check_simple_ring(geometry)?;

        let hectares = match self.method {
            AreaMethod::Geodesic => {
                // Exterior wound counter-clockwise so the signed area is the enclosed one
                let polygon = geometry.polygon().orient(Direction::Default);
                square_meters_to_hectares(polygon.geodesic_area_signed().abs())
            }
            AreaMethod::LegacyPlanar => {
                geometry.polygon().unsigned_area() * LEGACY_DEG2_TO_HECTARES
            }
        };

        if !hectares.is_finite() {
            return Err(area_failed("area is not a finite number"));
        }
        if hectares <= 0.0 {
            return Err(area_failed("ring encloses no area"));
        }

        Ok(AreaMeasurement {
            hectares,
            method: self.method,
        })
    }
}

fn area_failed(reason: &str) -> AnalysisError {
    AnalysisError::AreaCalculationFailed(reason.to_string())
}

/// A ring is simple when no two edges meet except consecutive edges at their shared vertex
fn check_simple_ring(geometry: &FieldGeometry) -> Result<()> {
    let mut coords: Vec<Coord<f64>> = geometry.exterior().coords().copied().collect();
    coords.dedup();

    let edges: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = edges.len();
    if n < 3 {
        return Err(area_failed("ring collapses to fewer than three edges"));
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                // Neighbouring edges touch at their shared vertex
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(LineIntersection::Collinear { .. }) if adjacent => {
                    return Err(area_failed("ring folds back on itself"));
                }
                Some(_) => {
                    return Err(area_failed("ring is self-intersecting"));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::{validate, RawGeometry};

    fn field(ring: &[(f64, f64)]) -> FieldGeometry {
        validate(&RawGeometry::polygon(ring)).unwrap()
    }

    fn reversed(ring: &[(f64, f64)]) -> Vec<(f64, f64)> {
        ring.iter().rev().copied().collect()
    }

    const EQUATOR_DEGREE: [(f64, f64); 5] =
        [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)];

    #[test]
    fn test_equator_degree_matches_reference() {
        // 1°x1° geodesic polygon at the equator on WGS84: 12,308,778,361 m²
        let reference_ha = 1_230_877.836;
        let area = AreaCalculator::geodesic()
            .compute(&field(&EQUATOR_DEGREE))
            .unwrap();
        assert_eq!(area.method, AreaMethod::Geodesic);
        assert!(
            ((area.hectares - reference_ha) / reference_ha).abs() < 1e-3,
            "got {} ha",
            area.hectares
        );
    }

    #[test]
    fn test_winding_does_not_change_area() {
        let ring = [
            (-1.152704, 46.181627),
            (-1.139893, 46.181627),
            (-1.141, 46.18699),
            (-1.150, 46.1865),
            (-1.152704, 46.181627),
        ];
        let calc = AreaCalculator::geodesic();
        let ccw = calc.compute(&field(&ring)).unwrap().hectares;
        let cw = calc.compute(&field(&reversed(&ring))).unwrap().hectares;
        assert!(ccw > 0.0);
        assert!(((ccw - cw) / ccw).abs() < 1e-9);
    }

    #[test]
    fn test_small_field_is_positive_and_deterministic() {
        // Roughly 100 m x 100 m in southern France
        let ring = [(3.0, 43.0), (3.00123, 43.0), (3.00123, 43.0009), (3.0, 43.0009), (3.0, 43.0)];
        let calc = AreaCalculator::default();
        let first = calc.compute(&field(&ring)).unwrap();
        let second = calc.compute(&field(&ring)).unwrap();
        assert_eq!(first, second);
        assert!(first.hectares > 0.9 && first.hectares < 1.1, "got {}", first.hectares);
    }

    #[test]
    fn test_legacy_planar_is_labeled() {
        let area = AreaCalculator::legacy_planar()
            .compute(&field(&EQUATOR_DEGREE))
            .unwrap();
        assert_eq!(area.method, AreaMethod::LegacyPlanar);
        assert!((area.hectares - LEGACY_DEG2_TO_HECTARES).abs() < 1e-6);

        let cw = AreaCalculator::legacy_planar()
            .compute(&field(&reversed(&EQUATOR_DEGREE)))
            .unwrap();
        assert!((cw.hectares - area.hectares).abs() < 1e-9);
    }

    #[test]
    fn test_bowtie_is_rejected() {
        let ring = [(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)];
        assert!(matches!(
            AreaCalculator::geodesic().compute(&field(&ring)),
            Err(AnalysisError::AreaCalculationFailed(_))
        ));
    }

    #[test]
    fn test_collinear_ring_is_rejected() {
        let ring = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)];
        assert!(matches!(
            AreaCalculator::geodesic().compute(&field(&ring)),
            Err(AnalysisError::AreaCalculationFailed(_))
        ));
    }

    #[test]
    fn test_repeated_vertices_are_tolerated() {
        let ring = [(0.0, 0.0), (0.01, 0.0), (0.01, 0.0), (0.01, 0.01), (0.0, 0.01), (0.0, 0.0)];
        assert!(AreaCalculator::geodesic().compute(&field(&ring)).is_ok());
    }
}
