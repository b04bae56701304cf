//! Drives one field from its stored boundary to a recorded NDVI health assessment.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::analysis::field_lock::FieldLocks;
use crate::analysis::store::{FieldAnalysisRecord, FieldId, FieldRecord, FieldStore, NewField, WriteAck};
use crate::collect::stac::stac_collect::SceneCatalog;
use crate::commons::basic_functions::round_to_decimals;
use crate::commons::config::PipelineConfig;
use crate::error::{AnalysisError, FailureKind, Result};
use crate::geo_core::{validate, FieldGeometry, RawGeometry};
use crate::geometric::area::{AreaCalculator, AreaMeasurement};
use crate::geometric::health::{classify, Classification, HealthInput};
use crate::geometric::raster::BandFetcher;
use crate::geometric::vegetation::{compute_ndvi, NdviResult};

/// Steps of an analysis, in execution order
///
/// `Failed` is the terminal state entered on the first error. The state
/// reached just before it is what [`AnalysisFailure::stage`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStage {
    Validating,
    AreaComputed,
    SceneSearching,
    BandFetching,
    NdviComputing,
    Classified,
    Persisted,
    Failed,
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a successful analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub field_id: FieldId,
    pub scene_id: String,
    pub ndvi: NdviResult,
    pub classification: Classification,
    pub area: AreaMeasurement,
    /// `Duplicate` when the latest scene had already been recorded
    pub write: WriteAck,
}

/// A failed analysis. `stage` is the last state reached before `Failed`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("analysis of field {field_id} failed after {stage}: {error}")]
pub struct AnalysisFailure {
    pub field_id: FieldId,
    pub stage: AnalysisStage,
    #[source]
    pub error: AnalysisError,
}

impl AnalysisFailure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

/// Health assessment attached to a field when it is created or reshaped
#[derive(Debug, Clone, PartialEq)]
struct Assessment {
    classification: Classification,
    /// Present when imagery covered the field
    ndvi: Option<NdviResult>,
}

pub struct AnalysisOrchestrator {
    catalog: Arc<dyn SceneCatalog>,
    fetcher: BandFetcher,
    store: Arc<dyn FieldStore>,
    area: AreaCalculator,
    locks: FieldLocks,
    ndvi_decimals: u32,
}

impl AnalysisOrchestrator {
    pub fn new(
        catalog: Arc<dyn SceneCatalog>,
        fetcher: BandFetcher,
        store: Arc<dyn FieldStore>,
        config: &PipelineConfig,
    ) -> Self {
        AnalysisOrchestrator {
            catalog,
            fetcher,
            store,
            area: AreaCalculator::geodesic(),
            locks: FieldLocks::new(),
            ndvi_decimals: config.ndvi_decimals,
        }
    }

    /// Replace the geodesic calculator, e.g. to reproduce legacy planar areas
    pub fn with_area_calculator(mut self, area: AreaCalculator) -> Self {
        self.area = area;
        self
    }

    /// Validate a boundary and measure it, no I/O involved
    pub fn compute_area(&self, raw: &RawGeometry) -> Result<AreaMeasurement> {
        let geometry = validate(raw)?;
        self.area.compute(&geometry)
    }

    /// Run the full pipeline for a stored field and record its NDVI
    ///
    /// A second call for a field whose analysis is still running fails with
    /// `AnalysisInProgress`. Calling again once the first one finished, with
    /// the same latest scene, writes nothing new.
    #[instrument(skip(self))]
    pub async fn analyze(&self, field_id: FieldId) -> std::result::Result<AnalysisReport, AnalysisFailure> {
        let mut stage = AnalysisStage::Validating;
        match self.run_analysis(field_id, &mut stage).await {
            Ok(report) => {
                info!(
                    ndvi = report.ndvi.mean,
                    status = %report.classification.status,
                    scene = %report.scene_id,
                    write = ?report.write,
                    "Analysis complete"
                );
                Ok(report)
            }
            Err(error) => {
                let reached = stage;
                advance(&mut stage, AnalysisStage::Failed);
                warn!(stage = %reached, %error, "Analysis failed");
                Err(AnalysisFailure {
                    field_id,
                    stage: reached,
                    error,
                })
            }
        }
    }

    async fn run_analysis(&self, field_id: FieldId, stage: &mut AnalysisStage) -> Result<AnalysisReport> {
        let _guard = self.locks.try_lock(field_id)?;

        let raw = self.store.get_field_geometry(field_id).await?;
        let geometry = validate(&raw)?;
        let area = self.area.compute(&geometry)?;
        advance(stage, AnalysisStage::AreaComputed);

        advance(stage, AnalysisStage::SceneSearching);
        let scene = self.catalog.search_latest(&geometry.bounding_box()).await?;

        advance(stage, AnalysisStage::BandFetching);
        let bands = self.fetcher.fetch_bands(&scene, &geometry).await?;

        advance(stage, AnalysisStage::NdviComputing);
        let ndvi = compute_ndvi(&bands.red, &bands.nir, scene.acquired_at, self.ndvi_decimals)?;
        let classification = classify(HealthInput::Ndvi(&ndvi));
        advance(stage, AnalysisStage::Classified);

        let write = self
            .store
            .write_analysis(FieldAnalysisRecord::new(field_id, &ndvi))
            .await?;
        advance(stage, AnalysisStage::Persisted);

        Ok(AnalysisReport {
            field_id,
            scene_id: scene.id,
            ndvi,
            classification,
            area,
            write,
        })
    }

    /// Analyse several fields concurrently, results in input order
    ///
    /// Ids are expected to be distinct; a repeated id fails with
    /// `AnalysisInProgress` while its first occurrence runs.
    pub async fn analyze_many(
        &self,
        field_ids: &[FieldId],
    ) -> Vec<std::result::Result<AnalysisReport, AnalysisFailure>> {
        join_all(field_ids.iter().map(|id| self.analyze(*id))).await
    }

    /// Validate, measure and assess a new field, then store it
    ///
    /// When imagery covers the field its NDVI observation is recorded too.
    #[instrument(skip_all)]
    pub async fn create_field(&self, raw: &RawGeometry) -> Result<FieldRecord> {
        let geometry = validate(raw)?;
        let area = self.area.compute(&geometry)?;
        let assessment = self.assess(&geometry, &area).await?;

        let record = self
            .store
            .insert_field(NewField {
                area_hectares: round_to_decimals(area.hectares, 2),
                area_method: area.method,
                ndvi_status: assessment.classification.status,
                geometry: RawGeometry::from(&geometry),
            })
            .await?;

        if let Some(ndvi) = &assessment.ndvi {
            self.store
                .write_analysis(FieldAnalysisRecord::new(record.id, ndvi))
                .await?;
        }

        info!(
            field_id = record.id,
            area_hectares = record.area_hectares,
            status = %record.ndvi_status,
            "Field saved"
        );
        Ok(record)
    }

    /// Replace the boundary of a stored field and re-assess it
    ///
    /// Holds the field lock, so it cannot overlap an analysis of the same field.
    #[instrument(skip(self, raw))]
    pub async fn update_field(&self, field_id: FieldId, raw: &RawGeometry) -> Result<FieldRecord> {
        let _guard = self.locks.try_lock(field_id)?;

        // Unknown ids fail before any network call
        self.store.get_field_geometry(field_id).await?;

        let geometry = validate(raw)?;
        let area = self.area.compute(&geometry)?;
        let assessment = self.assess(&geometry, &area).await?;

        let record = self
            .store
            .update_field(FieldRecord {
                id: field_id,
                area_hectares: round_to_decimals(area.hectares, 2),
                area_method: area.method,
                ndvi_status: assessment.classification.status,
                geometry: RawGeometry::from(&geometry),
            })
            .await?;

        if let Some(ndvi) = &assessment.ndvi {
            self.store
                .write_analysis(FieldAnalysisRecord::new(field_id, ndvi))
                .await?;
        }

        info!(area_hectares = record.area_hectares, status = %record.ndvi_status, "Field updated");
        Ok(record)
    }

    /// NDVI classification from the latest scene, area classification when no
    /// scene covers the field
    async fn assess(&self, geometry: &FieldGeometry, area: &AreaMeasurement) -> Result<Assessment> {
        let scene = match self.catalog.search_latest(&geometry.bounding_box()).await {
            Ok(scene) => scene,
            Err(AnalysisError::SceneNotFound) => {
                debug!("No scene covers the field, classifying by area");
                return Ok(Assessment {
                    classification: classify(HealthInput::Area(area)),
                    ndvi: None,
                });
            }
            Err(e) => return Err(e),
        };

        let bands = self.fetcher.fetch_bands(&scene, geometry).await?;
        let ndvi = compute_ndvi(&bands.red, &bands.nir, scene.acquired_at, self.ndvi_decimals)?;
        Ok(Assessment {
            classification: classify(HealthInput::Ndvi(&ndvi)),
            ndvi: Some(ndvi),
        })
    }
}

fn advance(stage: &mut AnalysisStage, next: AnalysisStage) {
    debug!(from = %stage, to = %next, "Analysis stage");
    *stage = next;
}
