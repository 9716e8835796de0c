//! Run state storage, keyed by opaque run id.
//!
//! The store is the single shared owner of the canonical `RunRecord`. All
//! mutation goes through `apply`, which serializes concurrent writers to
//! the same id and never exposes a partially merged record to readers.

mod memory;
mod sqlite;

pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;

use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::types::{RunPatch, RunRecord, RunSummary};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    NotFound(Uuid),

    #[error("Run already exists: {0}")]
    Conflict(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Id-keyed storage and retrieval of run records.
pub trait RunStore: Send + Sync {
    /// Insert a fresh record. Errors with `Conflict` if the id exists.
    fn create(&self, record: RunRecord) -> Result<(), StoreError>;

    /// Fetch the full record.
    fn get(&self, id: &Uuid) -> Result<RunRecord, StoreError>;

    /// Atomically merge a patch into the record and return the result.
    /// Writers to the same id are serialized; unrelated ids never contend
    /// on record state (the SQLite backend shares a connection, but the
    /// read-modify-write itself is transactional per call).
    fn apply(&self, id: &Uuid, patch: RunPatch) -> Result<RunRecord, StoreError>;

    /// Cheap status-only projection for polling clients.
    fn summary(&self, id: &Uuid) -> Result<RunSummary, StoreError> {
        Ok(self.get(id)?.summary())
    }
}
