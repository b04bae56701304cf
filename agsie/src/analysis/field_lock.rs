use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::analysis::store::FieldId;
use crate::error::{AnalysisError, Result};

/// Registry of fields with a running analysis
///
/// Locking never waits: a field already held is reported as
/// `AnalysisInProgress`.
#[derive(Debug, Clone, Default)]
pub struct FieldLocks {
    held: Arc<Mutex<HashSet<FieldId>>>,
}

impl FieldLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_lock(&self, field_id: FieldId) -> Result<FieldGuard> {
        if !self.held.lock().insert(field_id) {
            return Err(AnalysisError::AnalysisInProgress(field_id));
        }
        Ok(FieldGuard {
            field_id,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_locked(&self, field_id: FieldId) -> bool {
        self.held.lock().contains(&field_id)
    }
}

/// Held for the duration of one analysis. Dropping it (normally or because
/// the analysis future was cancelled) frees the field.
#[derive(Debug)]
pub struct FieldGuard {
    field_id: FieldId,
    held: Arc<Mutex<HashSet<FieldId>>>,
}

impl FieldGuard {
    pub fn field_id(&self) -> FieldId {
        self.field_id
    }
}

impl Drop for FieldGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.field_id);
    }
}
