//! The pipeline executor — drives one run through the stage DAG.
//!
//! Around every stage invocation the executor persists twice: the
//! PENDING → RUNNING transition before invoking, and the terminal
//! transition plus the stage's delta after it returns. Pollers therefore
//! always see which stage is in flight, and a crash leaves the persisted
//! trail pointing at the stage that was running.
//!
//! Stage failures never escape the run loop: they become record mutations
//! (errors append, status change). Only store infrastructure errors
//! propagate to the caller.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::store::RunStore;

use super::aggregator::Aggregator;
use super::contract::{CancelFlag, Stage, StageContext, StageOutcome};
use super::router;
use super::types::{Route, RunPatch, RunStatus, StageName, StageStatus};

enum StageFlow {
    Continue,
    Fatal,
}

pub struct PipelineExecutor {
    store: Arc<dyn RunStore>,
    stages: Vec<Box<dyn Stage>>,
    aggregator: Aggregator,
}

impl PipelineExecutor {
    pub fn new(
        store: Arc<dyn RunStore>,
        stages: Vec<Box<dyn Stage>>,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            store,
            stages,
            aggregator,
        }
    }

    /// Drive the run with the given id to a terminal status.
    pub fn run(&self, id: Uuid) -> Result<(), PipelineError> {
        tracing::info!(run_id = %id, "pipeline run starting");
        self.store.apply(
            &id,
            RunPatch::new()
                .run_status(RunStatus::Running)
                .log("pipeline started"),
        )?;

        let cancel = CancelFlag::new();

        loop {
            let record = self.store.get(&id)?;
            if record.status.is_terminal() {
                return Ok(());
            }

            let Some(next) = router::next_ready(&record) else {
                // Nothing ready and not yet terminal: the topology is
                // exhausted without reaching aggregation, which only
                // happens after a fatal short-circuit already returned.
                return Ok(());
            };

            if next == StageName::Aggregation {
                self.run_aggregation(&id)?;
                continue;
            }

            match self.invoke_stage(&id, next, &cancel)? {
                StageFlow::Continue => {}
                StageFlow::Fatal => {
                    self.short_circuit(&id, next)?;
                    return Ok(());
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Stage invocation
    // -----------------------------------------------------------------

    fn invoke_stage(
        &self,
        id: &Uuid,
        name: StageName,
        cancel: &CancelFlag,
    ) -> Result<StageFlow, PipelineError> {
        let Some(stage) = self.stages.iter().find(|s| s.name() == name) else {
            self.store.apply(
                id,
                RunPatch::new()
                    .stage(name, StageStatus::Failed)
                    .error(name, "no stage implementation registered")
                    .log(format!("{name} failed: no implementation")),
            )?;
            return Ok(if router::is_fatal(name) {
                StageFlow::Fatal
            } else {
                StageFlow::Continue
            });
        };

        // First persist: pollers observe the stage as RUNNING before any
        // stage work happens.
        let snapshot = self.store.apply(
            id,
            RunPatch::new()
                .stage(name, StageStatus::Running)
                .log(format!("{name} started")),
        )?;

        tracing::info!(run_id = %id, stage = name.as_str(), "stage starting");
        let started = Instant::now();
        let output = stage.execute(&StageContext {
            run: &snapshot,
            cancel,
        });
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut patch = RunPatch::new();
        for line in output.delta.logs {
            patch = patch.log(line);
        }
        for message in output.delta.errors {
            patch = patch.error(name, message);
        }

        if name == StageName::Classification {
            return self.classification_flow(id, patch, output.delta.artifact, output.outcome, elapsed_ms);
        }

        match output.outcome {
            StageOutcome::Fail(message) => {
                tracing::warn!(
                    run_id = %id,
                    stage = name.as_str(),
                    elapsed_ms,
                    error = %message,
                    "stage failed"
                );
                patch = patch
                    .stage(name, StageStatus::Failed)
                    .error(name, message)
                    .log(format!("{name} failed after {elapsed_ms}ms"));
                self.store.apply(id, patch)?;
                Ok(if router::is_fatal(name) {
                    StageFlow::Fatal
                } else {
                    StageFlow::Continue
                })
            }
            outcome => {
                if let StageOutcome::Route(label) = &outcome {
                    tracing::warn!(
                        run_id = %id,
                        stage = name.as_str(),
                        label = %label,
                        "ignoring route label from non-routing stage"
                    );
                }
                tracing::info!(run_id = %id, stage = name.as_str(), elapsed_ms, "stage finished");
                patch = patch
                    .stage(name, StageStatus::Finished)
                    .artifact(name, output.delta.artifact.unwrap_or(Value::Null))
                    .log(format!("{name} finished in {elapsed_ms}ms"));
                self.store.apply(id, patch)?;
                Ok(StageFlow::Continue)
            }
        }
    }

    /// Classification carries the pipeline's only conditional edge, so
    /// its terminal transition and the routing decision are persisted in
    /// one patch — pollers never observe classification FINISHED without
    /// the novelty decision applied.
    fn classification_flow(
        &self,
        id: &Uuid,
        mut patch: RunPatch,
        artifact: Option<Value>,
        outcome: StageOutcome,
        elapsed_ms: u64,
    ) -> Result<StageFlow, PipelineError> {
        let name = StageName::Classification;

        let label = match outcome {
            StageOutcome::Fail(message) => {
                tracing::warn!(run_id = %id, stage = name.as_str(), error = %message, "stage failed");
                patch = patch
                    .stage(name, StageStatus::Failed)
                    .error(name, message)
                    .log(format!("{name} failed after {elapsed_ms}ms"));
                self.store.apply(id, patch)?;
                return Ok(StageFlow::Fatal);
            }
            StageOutcome::Route(label) => label,
            StageOutcome::Ok => {
                // The classifier must declare a route; silence is a
                // contract violation just like an out-of-set label.
                let message = "classification returned no route label".to_string();
                tracing::error!(run_id = %id, stage = name.as_str(), "routing violation: no label");
                patch = patch
                    .stage(name, StageStatus::Failed)
                    .error(name, message)
                    .log(format!("{name} failed: routing violation"));
                self.store.apply(id, patch)?;
                return Ok(StageFlow::Fatal);
            }
        };

        match router::parse_route(&label) {
            Ok(route) => {
                patch = patch
                    .stage(name, StageStatus::Finished)
                    .artifact(name, artifact.unwrap_or(Value::Null))
                    .log(format!("{name} finished in {elapsed_ms}ms"));
                patch = match route {
                    Route::Present => patch.log("route present: scheduling novelty assessment"),
                    other => patch
                        .stage(StageName::Novelty, StageStatus::Skipped)
                        .log(format!("route {}: novelty assessment skipped", other.as_str())),
                };
                tracing::info!(
                    run_id = %id,
                    stage = name.as_str(),
                    elapsed_ms,
                    route = route.as_str(),
                    "stage finished"
                );
                self.store.apply(id, patch)?;
                Ok(StageFlow::Continue)
            }
            Err(e) => {
                // Out-of-set label: fatal, and the artifact is discarded
                // so the artifact ⇔ FINISHED invariant holds.
                tracing::error!(run_id = %id, stage = name.as_str(), error = %e, "routing violation");
                patch = patch
                    .stage(name, StageStatus::Failed)
                    .error(name, e.to_string())
                    .log(format!("{name} failed: routing violation"));
                self.store.apply(id, patch)?;
                Ok(StageFlow::Fatal)
            }
        }
    }

    // -----------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------

    fn run_aggregation(&self, id: &Uuid) -> Result<(), PipelineError> {
        let snapshot = self.store.apply(
            id,
            RunPatch::new()
                .stage(StageName::Aggregation, StageStatus::Running)
                .log("aggregation started"),
        )?;

        let composition = self.aggregator.compose(&snapshot);
        let verdict = composition.report.verdict;

        let any_failed = snapshot
            .stages
            .values()
            .any(|s| s.status == StageStatus::Failed);
        let final_status = if any_failed {
            RunStatus::Failed
        } else {
            RunStatus::Finished
        };

        let artifact = serde_json::to_value(&composition.report).unwrap_or(Value::Null);
        let mut patch = RunPatch::new()
            .stage(StageName::Aggregation, StageStatus::Finished)
            .artifact(StageName::Aggregation, artifact)
            .report(composition.report)
            .run_status(final_status)
            .log(format!("aggregation finished; run {}", final_status.as_str()));
        patch.errors.extend(composition.errors);

        self.store.apply(id, patch)?;
        tracing::info!(
            run_id = %id,
            status = final_status.as_str(),
            verdict = verdict.as_str(),
            "pipeline run complete"
        );
        Ok(())
    }

    /// A fatal stage failure aborts the run: every unreached stage is
    /// marked SKIPPED and a degraded report is still composed, so a
    /// terminal record always carries a report.
    fn short_circuit(&self, id: &Uuid, failed: StageName) -> Result<(), PipelineError> {
        let record = self.store.get(id)?;

        let mut patch = RunPatch::new();
        for stage in StageName::ALL {
            if record.stage_status(stage) == StageStatus::Pending {
                patch = patch.stage(stage, StageStatus::Skipped);
            }
        }

        let composition = self.aggregator.compose(&record);
        let verdict = composition.report.verdict;
        patch = patch
            .report(composition.report)
            .run_status(RunStatus::Failed)
            .log(format!("{failed} failed fatally; run aborted"));
        patch.errors.extend(composition.errors);

        self.store.apply(id, patch)?;
        tracing::warn!(
            run_id = %id,
            stage = failed.as_str(),
            verdict = verdict.as_str(),
            "pipeline run failed"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::contract::{StageDelta, StageOutput};
    use crate::pipeline::types::{RunInput, RunRecord, Verdict};
    use crate::store::MemoryRunStore;
    use chrono::Utc;
    use serde_json::json;

    /// Stage scripted by a closure — one canned behavior per test.
    struct ScriptedStage {
        name: StageName,
        behavior: Box<dyn Fn(&StageContext<'_>) -> StageOutput + Send + Sync>,
    }

    impl ScriptedStage {
        fn new(
            name: StageName,
            behavior: impl Fn(&StageContext<'_>) -> StageOutput + Send + Sync + 'static,
        ) -> Box<dyn Stage> {
            Box::new(Self {
                name,
                behavior: Box::new(behavior),
            })
        }
    }

    impl Stage for ScriptedStage {
        fn name(&self) -> StageName {
            self.name
        }

        fn execute(&self, ctx: &StageContext<'_>) -> StageOutput {
            (self.behavior)(ctx)
        }
    }

    fn ingestion_ok() -> Box<dyn Stage> {
        ScriptedStage::new(StageName::Ingestion, |_| {
            StageOutput::ok(StageDelta::with_artifact(
                json!({ "text": "We claim a novel method." }),
            ))
        })
    }

    fn classification_route(label: &'static str) -> Box<dyn Stage> {
        ScriptedStage::new(StageName::Classification, move |_| {
            StageOutput::routed(
                StageDelta::with_artifact(
                    json!({ "label": label, "summary": "scripted", "signals": [] }),
                ),
                label,
            )
        })
    }

    fn novelty_ok() -> Box<dyn Stage> {
        ScriptedStage::new(StageName::Novelty, |_| {
            StageOutput::ok(StageDelta::with_artifact(json!({
                "scores": { "originality": 0.9, "prior_art_distance": 0.8, "claim_strength": 0.9 },
                "basis": "scripted",
            })))
        })
    }

    fn seed_run(store: &Arc<dyn RunStore>) -> Uuid {
        let id = Uuid::new_v4();
        let record = RunRecord::new(
            id,
            RunInput {
                doc_uri: "doc-1".into(),
                metadata: serde_json::Map::new(),
            },
            Utc::now(),
        );
        store.create(record).unwrap();
        id
    }

    fn executor(stages: Vec<Box<dyn Stage>>) -> (PipelineExecutor, Arc<dyn RunStore>) {
        let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
        let exec = PipelineExecutor::new(store.clone(), stages, Aggregator::default());
        (exec, store)
    }

    /// artifacts[stage] present iff that stage FINISHED.
    fn assert_artifact_invariant(record: &RunRecord) {
        for stage in StageName::ALL {
            let finished = record.stage_status(stage) == StageStatus::Finished;
            assert_eq!(
                record.artifacts.contains_key(&stage),
                finished,
                "artifact invariant violated for {stage}"
            );
        }
    }

    #[test]
    fn present_route_runs_all_stages() {
        let (exec, store) = executor(vec![
            ingestion_ok(),
            classification_route("present"),
            novelty_ok(),
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Finished);
        for stage in StageName::ALL {
            assert_eq!(record.stage_status(stage), StageStatus::Finished);
        }
        let report = record.report.expect("terminal run must carry a report");
        assert_eq!(report.verdict, Verdict::Novel);
        assert!(!report.degraded);
        assert_artifact_invariant(&store.get(&id).unwrap());
    }

    #[test]
    fn absent_route_skips_novelty() {
        let (exec, store) = executor(vec![
            ingestion_ok(),
            classification_route("absent"),
            novelty_ok(),
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Finished);
        assert_eq!(record.stage_status(StageName::Novelty), StageStatus::Skipped);
        assert_eq!(
            record.stage_status(StageName::Aggregation),
            StageStatus::Finished
        );
        let report = record.report.unwrap();
        assert_eq!(report.verdict, Verdict::NotNovel);
        assert!(report.scores.is_none());
        assert_artifact_invariant(&store.get(&id).unwrap());
    }

    #[test]
    fn implied_route_also_skips_novelty() {
        let (exec, store) = executor(vec![
            ingestion_ok(),
            classification_route("implied"),
            novelty_ok(),
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.stage_status(StageName::Novelty), StageStatus::Skipped);
        assert_eq!(record.report.unwrap().verdict, Verdict::Undetermined);
    }

    #[test]
    fn ingestion_failure_short_circuits() {
        let failing = ScriptedStage::new(StageName::Ingestion, |_| {
            StageOutput::fail("document fetch failed: Document not found")
        });
        let (exec, store) = executor(vec![
            failing,
            classification_route("present"),
            novelty_ok(),
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.stage_status(StageName::Ingestion), StageStatus::Failed);
        for stage in [
            StageName::Classification,
            StageName::Novelty,
            StageName::Aggregation,
        ] {
            assert_eq!(record.stage_status(stage), StageStatus::Skipped);
            assert!(record.stages[&stage].started_at.is_none(), "{stage} must never start");
        }
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].stage, StageName::Ingestion);
        let report = record.report.expect("failed run still carries a report");
        assert_eq!(report.verdict, Verdict::Undetermined);
        assert!(report.degraded);
        assert_artifact_invariant(&store.get(&id).unwrap());
    }

    #[test]
    fn classification_failure_short_circuits() {
        let failing = ScriptedStage::new(StageName::Classification, |_| {
            StageOutput::fail("classifier offline")
        });
        let (exec, store) = executor(vec![ingestion_ok(), failing, novelty_ok()]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(
            record.stage_status(StageName::Classification),
            StageStatus::Failed
        );
        assert_eq!(record.stage_status(StageName::Novelty), StageStatus::Skipped);
        assert!(record.report.is_some());
    }

    #[test]
    fn novelty_failure_degrades_but_aggregates() {
        let failing = ScriptedStage::new(StageName::Novelty, |_| {
            StageOutput::fail("search backend offline")
        });
        let (exec, store) = executor(vec![
            ingestion_ok(),
            classification_route("present"),
            failing,
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.stage_status(StageName::Novelty), StageStatus::Failed);
        assert_eq!(
            record.stage_status(StageName::Aggregation),
            StageStatus::Finished
        );
        let report = record.report.unwrap();
        assert_eq!(report.verdict, Verdict::Undetermined);
        assert!(report.degraded);
        assert_artifact_invariant(&store.get(&id).unwrap());
    }

    #[test]
    fn out_of_set_route_label_is_fatal() {
        let (exec, store) = executor(vec![
            ingestion_ok(),
            classification_route("maybe"),
            novelty_ok(),
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(
            record.stage_status(StageName::Classification),
            StageStatus::Failed
        );
        // The violating artifact is discarded.
        assert!(!record.artifacts.contains_key(&StageName::Classification));
        assert!(record
            .errors
            .iter()
            .any(|e| e.message.contains("unrecognized route label")));
    }

    #[test]
    fn classification_without_route_is_fatal() {
        let silent = ScriptedStage::new(StageName::Classification, |_| {
            StageOutput::ok(StageDelta::with_artifact(json!({ "label": "present" })))
        });
        let (exec, store) = executor(vec![ingestion_ok(), silent, novelty_ok()]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record
            .errors
            .iter()
            .any(|e| e.message.contains("no route label")));
    }

    #[test]
    fn missing_stage_implementation_fails_the_run() {
        let (exec, store) = executor(vec![ingestion_ok()]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record
            .errors
            .iter()
            .any(|e| e.message.contains("no stage implementation")));
    }

    #[test]
    fn transitions_persist_in_invocation_order() {
        let (exec, store) = executor(vec![
            ingestion_ok(),
            classification_route("present"),
            novelty_ok(),
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        let position = |needle: &str| {
            record
                .logs
                .iter()
                .position(|l| l.contains(needle))
                .unwrap_or_else(|| panic!("log line missing: {needle}"))
        };
        assert!(position("ingestion started") < position("ingestion finished"));
        assert!(position("ingestion finished") < position("classification started"));
        assert!(position("classification started") < position("novelty started"));
        assert!(position("novelty started") < position("aggregation started"));
    }

    #[test]
    fn stage_sees_upstream_artifacts_in_snapshot() {
        let checking = ScriptedStage::new(StageName::Classification, |ctx| {
            let text = ctx
                .artifact(StageName::Ingestion)
                .and_then(|a| a.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            assert!(text.contains("novel method"));
            StageOutput::routed(
                StageDelta::with_artifact(json!({ "label": "absent", "summary": "", "signals": [] })),
                "absent",
            )
        });
        let (exec, store) = executor(vec![ingestion_ok(), checking, novelty_ok()]);
        let id = seed_run(&store);
        exec.run(id).unwrap();
        assert_eq!(store.get(&id).unwrap().status, RunStatus::Finished);
    }

    #[test]
    fn stage_timestamps_are_populated() {
        let (exec, store) = executor(vec![
            ingestion_ok(),
            classification_route("absent"),
            novelty_ok(),
        ]);
        let id = seed_run(&store);
        exec.run(id).unwrap();

        let record = store.get(&id).unwrap();
        let ingestion = &record.stages[&StageName::Ingestion];
        assert!(ingestion.started_at.is_some());
        assert!(ingestion.finished_at.is_some());
        assert!(ingestion.started_at <= ingestion.finished_at);

        // Skipped stages never started but carry a decision timestamp.
        let novelty = &record.stages[&StageName::Novelty];
        assert!(novelty.started_at.is_none());
        assert!(novelty.finished_at.is_some());
    }
}
