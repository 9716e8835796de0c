//! Static topology and routing rules.
//!
//! The pipeline is a small fixed DAG: ingestion → classification →
//! (novelty | skip) → aggregation. The single conditional edge is driven
//! by the classification route label; everything else is dependency order.

use crate::error::PipelineError;

use super::types::{Route, RunRecord, StageName, StageStatus};

/// Static dependencies of each stage.
///
/// Novelty's inclusion is conditional, handled by marking it SKIPPED at
/// routing time; a SKIPPED dependency counts as satisfied.
pub fn dependencies(stage: StageName) -> &'static [StageName] {
    match stage {
        StageName::Ingestion => &[],
        StageName::Classification => &[StageName::Ingestion],
        StageName::Novelty => &[StageName::Classification],
        StageName::Aggregation => &[StageName::Classification, StageName::Novelty],
    }
}

/// Whether a failure of this stage aborts the run.
///
/// Ingestion and classification are load-bearing: without them no route
/// exists. Novelty is non-fatal — aggregation degrades instead.
/// Aggregation itself is total and never reports failure.
pub fn is_fatal(stage: StageName) -> bool {
    matches!(stage, StageName::Ingestion | StageName::Classification)
}

/// Parse the external classifier's route label against the closed set.
/// An unrecognized label is a contract violation — the router never
/// guesses.
pub fn parse_route(label: &str) -> Result<Route, PipelineError> {
    Route::parse(label).ok_or_else(|| {
        PipelineError::Routing(format!("unrecognized route label: {label:?}"))
    })
}

/// Next stage to run given the current record, or None when nothing is
/// ready. Stages are considered in pipeline order; a stage is ready when
/// it is PENDING and every dependency is satisfied.
pub fn next_ready(record: &RunRecord) -> Option<StageName> {
    StageName::ALL.into_iter().find(|&stage| {
        record.stage_status(stage) == StageStatus::Pending
            && dependencies(stage)
                .iter()
                .all(|&dep| dependency_satisfied(record, dep))
    })
}

fn dependency_satisfied(record: &RunRecord, dep: StageName) -> bool {
    match record.stage_status(dep) {
        StageStatus::Finished | StageStatus::Skipped => true,
        StageStatus::Failed => !is_fatal(dep),
        StageStatus::Pending | StageStatus::Running => false,
    }
}
