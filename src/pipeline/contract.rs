//! The uniform stage contract.
//!
//! Every analysis stage implements `Stage`: consume a read snapshot of the
//! run, return a delta plus an outcome tag. The executor persists only
//! through the returned delta — stages never write to the store directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::types::{RunRecord, StageName};

/// Cooperative cancellation hook passed to every stage invocation.
///
/// The executor does not trigger it in the base design; a hosting
/// environment with a deadline can. Stages doing long I/O should check
/// `is_cancelled` between steps and bail out with a `Fail` outcome.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Read view of the run handed to a stage.
pub struct StageContext<'a> {
    pub run: &'a RunRecord,
    pub cancel: &'a CancelFlag,
}

impl<'a> StageContext<'a> {
    pub fn doc_uri(&self) -> &str {
        &self.run.input.doc_uri
    }

    /// Output of an upstream stage, if it finished.
    pub fn artifact(&self, stage: StageName) -> Option<&'a Value> {
        self.run.artifacts.get(&stage)
    }
}

/// Partial state update returned by a stage, merged centrally.
///
/// `errors` carries non-fatal warnings; a fatal failure is expressed
/// through `StageOutcome::Fail` instead.
#[derive(Debug, Default)]
pub struct StageDelta {
    pub artifact: Option<Value>,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
}

impl StageDelta {
    pub fn with_artifact(artifact: Value) -> Self {
        Self {
            artifact: Some(artifact),
            ..Self::default()
        }
    }

    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }
}

/// Outcome tag reported by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Completed; delta carries the artifact.
    Ok,
    /// Completed with a route label (classification stage only). The label
    /// is the raw string from the external collaborator — the router
    /// parses it against the closed set and treats anything else as a
    /// fatal contract violation.
    Route(String),
    /// Failed; the message is recorded in the run's error trail.
    Fail(String),
}

/// What a stage invocation hands back to the executor.
#[derive(Debug)]
pub struct StageOutput {
    pub delta: StageDelta,
    pub outcome: StageOutcome,
}

impl StageOutput {
    pub fn ok(delta: StageDelta) -> Self {
        Self {
            delta,
            outcome: StageOutcome::Ok,
        }
    }

    pub fn routed(delta: StageDelta, label: impl Into<String>) -> Self {
        Self {
            delta,
            outcome: StageOutcome::Route(label.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            delta: StageDelta::default(),
            outcome: StageOutcome::Fail(message.into()),
        }
    }

    pub fn fail_with(delta: StageDelta, message: impl Into<String>) -> Self {
        Self {
            delta,
            outcome: StageOutcome::Fail(message.into()),
        }
    }
}

/// A unit of pipeline work. Implementations may perform blocking I/O; the
/// executor invokes at most once per run and only from a blocking context.
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    fn execute(&self, ctx: &StageContext<'_>) -> StageOutput;
}
