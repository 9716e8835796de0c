//! In-memory run store backed by a mutex-guarded map.
//!
//! The default backend for tests and single-process deployments that do
//! not need runs to survive a restart.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::pipeline::types::{RunPatch, RunRecord};

use super::{RunStore, StoreError};

#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<Uuid, RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn create(&self, record: RunRecord) -> Result<(), StoreError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| StoreError::Backend("run map lock poisoned".into()))?;
        if runs.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }
        runs.insert(record.id, record);
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<RunRecord, StoreError> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| StoreError::Backend("run map lock poisoned".into()))?;
        runs.get(id).cloned().ok_or(StoreError::NotFound(*id))
    }

    fn apply(&self, id: &Uuid, patch: RunPatch) -> Result<RunRecord, StoreError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| StoreError::Backend("run map lock poisoned".into()))?;
        let record = runs.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        record.apply(patch, Utc::now());
        Ok(record.clone())
    }
}
