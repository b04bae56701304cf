//! Persistence collaborator of the pipeline and an in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::geo_core::RawGeometry;
use crate::geometric::area::AreaMethod;
use crate::geometric::health::HealthStatus;
use crate::geometric::vegetation::NdviResult;

pub type FieldId = i64;

/// A stored field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub id: FieldId,
    /// Rounded to two decimals
    pub area_hectares: f64,
    pub area_method: AreaMethod,
    pub ndvi_status: HealthStatus,
    pub geometry: RawGeometry,
}

/// Everything of a [`FieldRecord`] but the id the store assigns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewField {
    pub area_hectares: f64,
    pub area_method: AreaMethod,
    pub ndvi_status: HealthStatus,
    pub geometry: RawGeometry,
}

impl NewField {
    pub fn with_id(self, id: FieldId) -> FieldRecord {
        FieldRecord {
            id,
            area_hectares: self.area_hectares,
            area_method: self.area_method,
            ndvi_status: self.ndvi_status,
            geometry: self.geometry,
        }
    }
}

/// One NDVI observation of a field. Unique per (field, scene date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAnalysisRecord {
    pub field_id: FieldId,
    pub ndvi_mean: f64,
    pub scene_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl FieldAnalysisRecord {
    pub fn new(field_id: FieldId, ndvi: &NdviResult) -> Self {
        FieldAnalysisRecord {
            field_id,
            ndvi_mean: ndvi.mean,
            scene_date: ndvi.scene_date,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of an accepted analysis write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAck {
    Created,
    /// A record for the same field and scene date already exists, nothing written
    Duplicate,
}

#[async_trait]
pub trait FieldStore: Send + Sync {
    /// `FieldNotFound` for unknown ids
    async fn get_field_geometry(&self, field_id: FieldId) -> Result<RawGeometry>;

    /// Idempotent per (field, scene date). `PersistenceConflict` when the
    /// store refuses the record, e.g. its field no longer exists.
    async fn write_analysis(&self, record: FieldAnalysisRecord) -> Result<WriteAck>;

    async fn insert_field(&self, field: NewField) -> Result<FieldRecord>;

    async fn update_field(&self, field: FieldRecord) -> Result<FieldRecord>;

    /// Removes the field and all of its analyses
    async fn delete_field(&self, field_id: FieldId) -> Result<()>;

    async fn list_fields(&self) -> Result<Vec<FieldRecord>>;

    /// Analyses of one field, oldest scene first
    async fn list_analyses(&self, field_id: FieldId) -> Result<Vec<FieldAnalysisRecord>>;
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: FieldId,
    fields: BTreeMap<FieldId, FieldRecord>,
    analyses: BTreeMap<(FieldId, DateTime<Utc>), FieldAnalysisRecord>,
}

/// [`FieldStore`] kept in process memory
#[derive(Debug, Default)]
pub struct MemoryFieldStore {
    state: Mutex<StoreState>,
}

impl MemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FieldStore for MemoryFieldStore {
    async fn get_field_geometry(&self, field_id: FieldId) -> Result<RawGeometry> {
        self.state
            .lock()
            .fields
            .get(&field_id)
            .map(|f| f.geometry.clone())
            .ok_or(AnalysisError::FieldNotFound(field_id))
    }

    async fn write_analysis(&self, record: FieldAnalysisRecord) -> Result<WriteAck> {
        let mut state = self.state.lock();
        if !state.fields.contains_key(&record.field_id) {
            return Err(AnalysisError::PersistenceConflict(format!(
                "field {} no longer exists",
                record.field_id
            )));
        }

        let key = (record.field_id, record.scene_date);
        if state.analyses.contains_key(&key) {
            debug!(field_id = record.field_id, scene_date = %record.scene_date, "Analysis already recorded");
            return Ok(WriteAck::Duplicate);
        }
        state.analyses.insert(key, record);
        Ok(WriteAck::Created)
    }

    async fn insert_field(&self, field: NewField) -> Result<FieldRecord> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let record = field.with_id(state.next_id);
        state.fields.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_field(&self, field: FieldRecord) -> Result<FieldRecord> {
        let mut state = self.state.lock();
        match state.fields.get_mut(&field.id) {
            Some(existing) => {
                *existing = field.clone();
                Ok(field)
            }
            None => Err(AnalysisError::FieldNotFound(field.id)),
        }
    }

    async fn delete_field(&self, field_id: FieldId) -> Result<()> {
        let mut state = self.state.lock();
        if state.fields.remove(&field_id).is_none() {
            return Err(AnalysisError::FieldNotFound(field_id));
        }
        state.analyses.retain(|(id, _), _| *id != field_id);
        Ok(())
    }

    async fn list_fields(&self) -> Result<Vec<FieldRecord>> {
        Ok(self.state.lock().fields.values().cloned().collect())
    }

    async fn list_analyses(&self, field_id: FieldId) -> Result<Vec<FieldAnalysisRecord>> {
        let state = self.state.lock();
        if !state.fields.contains_key(&field_id) {
            return Err(AnalysisError::FieldNotFound(field_id));
        }
        Ok(state
            .analyses
            .iter()
            .filter(|((id, _), _)| *id == field_id)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_field() -> NewField {
        NewField {
            area_hectares: 1.23,
            area_method: AreaMethod::Geodesic,
            ndvi_status: HealthStatus::Moderate,
            geometry: RawGeometry::polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
        }
    }

    fn analysis(field_id: FieldId, day: u32) -> FieldAnalysisRecord {
        FieldAnalysisRecord {
            field_id,
            ndvi_mean: 0.42,
            scene_date: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MemoryFieldStore::new();
        let a = store.insert_field(new_field()).await.unwrap();
        let b = store.insert_field(new_field()).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.list_fields().await.unwrap().len(), 2);
        assert_eq!(store.get_field_geometry(a.id).await.unwrap(), new_field().geometry);
    }

    #[tokio::test]
    async fn test_write_analysis_is_idempotent() {
        let store = MemoryFieldStore::new();
        let field = store.insert_field(new_field()).await.unwrap();

        assert_eq!(store.write_analysis(analysis(field.id, 1)).await, Ok(WriteAck::Created));
        assert_eq!(store.write_analysis(analysis(field.id, 1)).await, Ok(WriteAck::Duplicate));
        assert_eq!(store.write_analysis(analysis(field.id, 2)).await, Ok(WriteAck::Created));

        let analyses = store.list_analyses(field.id).await.unwrap();
        assert_eq!(analyses.len(), 2);
        assert!(analyses[0].scene_date < analyses[1].scene_date);
    }

    #[tokio::test]
    async fn test_write_for_missing_field_conflicts() {
        let store = MemoryFieldStore::new();
        assert!(matches!(
            store.write_analysis(analysis(99, 1)).await,
            Err(AnalysisError::PersistenceConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryFieldStore::new();
        let keep = store.insert_field(new_field()).await.unwrap();
        let gone = store.insert_field(new_field()).await.unwrap();
        store.write_analysis(analysis(keep.id, 1)).await.unwrap();
        store.write_analysis(analysis(gone.id, 1)).await.unwrap();

        store.delete_field(gone.id).await.unwrap();

        assert_eq!(
            store.get_field_geometry(gone.id).await,
            Err(AnalysisError::FieldNotFound(gone.id))
        );
        assert_eq!(store.list_analyses(keep.id).await.unwrap().len(), 1);
        assert_eq!(store.state.lock().analyses.len(), 1);
        assert_eq!(store.delete_field(gone.id).await, Err(AnalysisError::FieldNotFound(gone.id)));
    }

    #[tokio::test]
    async fn test_update_unknown_field() {
        let store = MemoryFieldStore::new();
        let record = new_field().with_id(5);
        assert_eq!(store.update_field(record).await, Err(AnalysisError::FieldNotFound(5)));
    }
}
