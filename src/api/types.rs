//! Shared types for the HTTP API layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::PipelineService;
use crate::pipeline::types::RunInput;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub service: Arc<PipelineService>,
}

impl ApiContext {
    pub fn new(service: Arc<PipelineService>) -> Self {
        Self { service }
    }
}

// ---------------------------------------------------------------------------
// Request/response bodies
// ---------------------------------------------------------------------------

/// Submission body for `POST /api/runs`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub doc_uri: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<SubmitRequest> for RunInput {
    fn from(req: SubmitRequest) -> Self {
        RunInput {
            doc_uri: req.doc_uri,
            metadata: req.metadata,
        }
    }
}

/// Acknowledgement for an accepted submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub run_id: Uuid,
}

/// Body for `GET /api/health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: &'static str,
    pub version: &'static str,
}
