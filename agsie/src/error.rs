//! Error types for the field analysis pipeline.

use thiserror::Error;

use crate::analysis::store::FieldId;

/// Errors that can occur while validating, measuring or analysing a field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The ring is not closed, too short, has holes or non-finite vertices.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Anything other than a single Polygon.
    #[error("unsupported geometry type: {0} (only Polygon is accepted)")]
    UnsupportedGeometryType(String),

    /// A vertex lies outside the WGS84 longitude/latitude range.
    #[error("vertex ({lon}, {lat}) is outside WGS84 bounds")]
    OutOfCrsBounds { lon: f64, lat: f64 },

    /// The geodesic area could not be evaluated for this ring.
    #[error("area calculation failed: {0}")]
    AreaCalculationFailed(String),

    /// The catalog returned no scene for the bounding box.
    #[error("no satellite scene found for the field")]
    SceneNotFound,

    /// Timeout, transport error or non-2xx answer from the catalog.
    #[error("scene catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// A band could not be opened or read.
    #[error("raster fetch failed: {0}")]
    RasterFetch(String),

    /// Every pixel of the window is masked out (cloud, nodata, outside coverage).
    #[error("no valid pixels in the field footprint")]
    NoValidPixels,

    /// Another analysis of the same field is running.
    #[error("an analysis is already in progress for field {0}")]
    AnalysisInProgress(FieldId),

    /// The persistence collaborator refused the write.
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    /// The persistence collaborator does not know this field.
    #[error("field {0} not found")]
    FieldNotFound(FieldId),
}

/// Discriminant of [`AnalysisError`], carried by a failed analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidGeometry,
    UnsupportedGeometryType,
    OutOfCrsBounds,
    AreaCalculationFailed,
    SceneNotFound,
    CatalogUnavailable,
    RasterFetch,
    NoValidPixels,
    AnalysisInProgress,
    PersistenceConflict,
    FieldNotFound,
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::InvalidGeometry(_) => FailureKind::InvalidGeometry,
            AnalysisError::UnsupportedGeometryType(_) => FailureKind::UnsupportedGeometryType,
            AnalysisError::OutOfCrsBounds { .. } => FailureKind::OutOfCrsBounds,
            AnalysisError::AreaCalculationFailed(_) => FailureKind::AreaCalculationFailed,
            AnalysisError::SceneNotFound => FailureKind::SceneNotFound,
            AnalysisError::CatalogUnavailable(_) => FailureKind::CatalogUnavailable,
            AnalysisError::RasterFetch(_) => FailureKind::RasterFetch,
            AnalysisError::NoValidPixels => FailureKind::NoValidPixels,
            AnalysisError::AnalysisInProgress(_) => FailureKind::AnalysisInProgress,
            AnalysisError::PersistenceConflict(_) => FailureKind::PersistenceConflict,
            AnalysisError::FieldNotFound(_) => FailureKind::FieldNotFound,
        }
    }

    /// Transient I/O failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::CatalogUnavailable(_) | AnalysisError::RasterFetch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_io_errors_are_retryable() {
        assert!(AnalysisError::CatalogUnavailable("timeout".into()).is_retryable());
        assert!(AnalysisError::RasterFetch("404".into()).is_retryable());
        assert!(!AnalysisError::SceneNotFound.is_retryable());
        assert!(!AnalysisError::InvalidGeometry("open ring".into()).is_retryable());
        assert!(!AnalysisError::NoValidPixels.is_retryable());
    }

    #[test]
    fn test_kind_matches_variant() {
        let err = AnalysisError::OutOfCrsBounds {
            lon: 181.0,
            lat: 0.0,
        };
        assert_eq!(err.kind(), FailureKind::OutOfCrsBounds);
        assert_eq!(
            AnalysisError::AnalysisInProgress(7).kind(),
            FailureKind::AnalysisInProgress
        );
    }
}
