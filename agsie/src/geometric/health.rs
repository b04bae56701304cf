use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometric::area::AreaMeasurement;
use crate::geometric::vegetation::NdviResult;

/// Crop health buckets, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Poor,
    Moderate,
    Healthy,
}

impl HealthStatus {
    pub fn recommendation(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "Maintain irrigation",
            HealthStatus::Moderate => "Monitor crop stress",
            HealthStatus::Poor => "Immediate intervention required",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Poor => "Poor",
            HealthStatus::Moderate => "Moderate",
            HealthStatus::Healthy => "Healthy",
        };
        f.write_str(s)
    }
}

/// Two ascending thresholds splitting a measure into three buckets.
/// A value equal to a threshold falls in the upper bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub name: &'static str,
    pub moderate_from: f64,
    pub healthy_from: f64,
}

/// Mean NDVI: `< 0.2` Poor, `[0.2, 0.33)` Moderate, `>= 0.33` Healthy
pub const NDVI_POLICY: ThresholdPolicy = ThresholdPolicy {
    name: "ndvi",
    moderate_from: 0.2,
    healthy_from: 0.33,
};

/// Field size in hectares, used only when no imagery covers the field:
/// `< 0.5` Poor, `[0.5, 2.0)` Moderate, `>= 2.0` Healthy
pub const AREA_POLICY: ThresholdPolicy = ThresholdPolicy {
    name: "area_hectares",
    moderate_from: 0.5,
    healthy_from: 2.0,
};

impl ThresholdPolicy {
    pub fn bucket(&self, value: f64) -> HealthStatus {
        if value >= self.healthy_from {
            HealthStatus::Healthy
        } else if value >= self.moderate_from {
            HealthStatus::Moderate
        } else {
            HealthStatus::Poor
        }
    }
}

/// What a classification is based on
#[derive(Debug, Clone, Copy)]
pub enum HealthInput<'a> {
    Ndvi(&'a NdviResult),
    /// Fallback for fields without satellite coverage
    Area(&'a AreaMeasurement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationBasis {
    Ndvi,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub status: HealthStatus,
    pub recommendation: String,
    pub basis: ClassificationBasis,
}

pub fn classify(input: HealthInput<'_>) -> Classification {
    let (status, basis) = match input {
        HealthInput::Ndvi(ndvi) => (NDVI_POLICY.bucket(ndvi.mean), ClassificationBasis::Ndvi),
        HealthInput::Area(area) => (AREA_POLICY.bucket(area.hectares), ClassificationBasis::Area),
    };
    Classification {
        status,
        recommendation: status.recommendation().to_string(),
        basis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::area::AreaMethod;
    use chrono::{TimeZone, Utc};

    fn ndvi(mean: f64) -> NdviResult {
        NdviResult {
            mean,
            valid_pixels: 1,
            scene_date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn area(hectares: f64) -> AreaMeasurement {
        AreaMeasurement {
            hectares,
            method: AreaMethod::Geodesic,
        }
    }

    #[test]
    fn test_ndvi_buckets_at_boundaries() {
        assert_eq!(NDVI_POLICY.bucket(-1.0), HealthStatus::Poor);
        assert_eq!(NDVI_POLICY.bucket(0.1999), HealthStatus::Poor);
        assert_eq!(NDVI_POLICY.bucket(0.2), HealthStatus::Moderate);
        assert_eq!(NDVI_POLICY.bucket(0.3299), HealthStatus::Moderate);
        assert_eq!(NDVI_POLICY.bucket(0.33), HealthStatus::Healthy);
        assert_eq!(NDVI_POLICY.bucket(1.0), HealthStatus::Healthy);
    }

    #[test]
    fn test_area_buckets_at_boundaries() {
        assert_eq!(AREA_POLICY.bucket(0.49), HealthStatus::Poor);
        assert_eq!(AREA_POLICY.bucket(0.5), HealthStatus::Moderate);
        assert_eq!(AREA_POLICY.bucket(1.99), HealthStatus::Moderate);
        assert_eq!(AREA_POLICY.bucket(2.0), HealthStatus::Healthy);
    }

    #[test]
    fn test_classify_ndvi() {
        let c = classify(HealthInput::Ndvi(&ndvi(0.3333)));
        assert_eq!(c.status, HealthStatus::Healthy);
        assert_eq!(c.recommendation, "Maintain irrigation");
        assert_eq!(c.basis, ClassificationBasis::Ndvi);
        assert_eq!(c.status.to_string(), "Healthy");
    }

    #[test]
    fn test_classify_area_fallback() {
        let c = classify(HealthInput::Area(&area(0.3)));
        assert_eq!(c.status, HealthStatus::Poor);
        assert_eq!(c.recommendation, "Immediate intervention required");
        assert_eq!(c.basis, ClassificationBasis::Area);

        let c = classify(HealthInput::Area(&area(1.0)));
        assert_eq!(c.recommendation, "Monitor crop stress");
    }

    #[test]
    fn test_statuses_are_ordered() {
        assert!(HealthStatus::Poor < HealthStatus::Moderate);
        assert!(HealthStatus::Moderate < HealthStatus::Healthy);
    }
}
