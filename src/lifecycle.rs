//! Request lifecycle: submit-and-poll around the pipeline executor.
//!
//! `submit` validates the input, allocates the run id, seeds the record,
//! and hands execution to a blocking worker — the caller gets the id back
//! immediately and follows progress through `status`. One run id, one
//! executor invocation; re-running an id is not a thing this layer offers.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::types::{RunInput, RunRecord, RunSummary};
use crate::pipeline::PipelineExecutor;
use crate::store::RunStore;

pub struct PipelineService {
    store: Arc<dyn RunStore>,
    executor: Arc<PipelineExecutor>,
}

impl PipelineService {
    pub fn new(store: Arc<dyn RunStore>, executor: Arc<PipelineExecutor>) -> Self {
        Self { store, executor }
    }

    /// Accept a submission and start the run in the background.
    ///
    /// Returns as soon as the PENDING record is durable; the executor runs
    /// on the blocking pool since stages do blocking I/O.
    pub fn submit(&self, input: RunInput) -> Result<Uuid, PipelineError> {
        if input.doc_uri.trim().is_empty() {
            return Err(PipelineError::Validation(
                "doc_uri must not be empty".into(),
            ));
        }

        let id = Uuid::new_v4();
        let record = RunRecord::new(id, input, chrono::Utc::now());
        self.store
            .create(record)
            .map_err(PipelineError::from_store)?;
        tracing::info!(run_id = %id, "run accepted");

        let executor = self.executor.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = executor.run(id) {
                // Stage failures are already in the record; only store
                // infrastructure errors land here.
                tracing::error!(run_id = %id, error = %e, "run aborted by store failure");
            }
        });

        Ok(id)
    }

    /// Condensed status projection for polling clients.
    pub fn status(&self, id: &Uuid) -> Result<RunSummary, PipelineError> {
        self.store.summary(id).map_err(PipelineError::from_store)
    }

    /// Full record: per-stage states, artifacts, logs, errors.
    pub fn debug(&self, id: &Uuid) -> Result<RunRecord, PipelineError> {
        self.store.get(id).map_err(PipelineError::from_store)
    }
}
