//! Top-level error taxonomy for the pipeline core.
//!
//! Stage-level failures never surface here — the executor converts them
//! into run-record mutations. What remains is what callers of the
//! submission/status interfaces can actually observe, plus routing
//! contract violations and store infrastructure errors.

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed submission, rejected before a run id is allocated.
    #[error("Invalid submission: {0}")]
    Validation(String),

    /// Unknown run id on a read.
    #[error("Run not found: {0}")]
    NotFound(Uuid),

    /// The classifier returned a route label outside the closed set.
    #[error("Routing violation: {0}")]
    Routing(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Lift store-level NotFound into the caller-facing variant.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::Store(other),
        }
    }
}
