//! Core run-state model for the analysis pipeline.
//!
//! `RunRecord` is the canonical document describing one run: input,
//! per-stage lifecycle, artifacts, diagnostics, and the final report.
//! All mutation flows through `RunRecord::apply` so the merge semantics
//! (append-only logs/errors, monotonic statuses, timestamp refresh) live
//! in exactly one place.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Overall run status. Forward-only; FINISHED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// Per-stage status. PENDING → RUNNING → FINISHED|FAILED, or
/// PENDING → SKIPPED when the router bypasses the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageStatus {
    Pending,
    Running,
    Finished,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Finished | StageStatus::Failed | StageStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "PENDING",
            StageStatus::Running => "RUNNING",
            StageStatus::Finished => "FINISHED",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "SKIPPED",
        }
    }
}

// ---------------------------------------------------------------------------
// Stages and routes
// ---------------------------------------------------------------------------

/// The four stages of the static pipeline topology, in dependency order.
///
/// `Ord` follows declaration order, so iterating a `BTreeMap<StageName, _>`
/// yields stages in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Ingestion,
    Classification,
    Novelty,
    Aggregation,
}

impl StageName {
    pub const ALL: [StageName; 4] = [
        StageName::Ingestion,
        StageName::Classification,
        StageName::Novelty,
        StageName::Aggregation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Ingestion => "ingestion",
            StageName::Classification => "classification",
            StageName::Novelty => "novelty",
            StageName::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification route — the closed label set that decides whether the
/// novelty stage runs. An out-of-set label from the external classifier is
/// a contract violation, caught at the router boundary (`Route::parse`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Present,
    Implied,
    Absent,
}

impl Route {
    /// Parse an external label. Case-insensitive; returns None for
    /// anything outside the closed set.
    pub fn parse(label: &str) -> Option<Route> {
        match label.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Route::Present),
            "implied" => Some(Route::Implied),
            "absent" => Some(Route::Absent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Present => "present",
            Route::Implied => "implied",
            Route::Absent => "absent",
        }
    }
}

// ---------------------------------------------------------------------------
// Record substructures
// ---------------------------------------------------------------------------

/// Runtime state of one stage within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageState {
    fn pending() -> Self {
        Self {
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Caller-supplied input: the document reference plus opaque metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    pub doc_uri: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// One structured error entry. Append-only within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub stage: StageName,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Final verdict on the manuscript's invention disclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Novel,
    NotNovel,
    Undetermined,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Novel => "NOVEL",
            Verdict::NotNovel => "NOT_NOVEL",
            Verdict::Undetermined => "UNDETERMINED",
        }
    }
}

/// Numeric sub-scores produced by the novelty stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyScores {
    pub originality: f64,
    pub prior_art_distance: f64,
    pub claim_strength: f64,
}

/// The aggregator's client-facing report. Present exactly when the run
/// has reached a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub verdict: Verdict,
    pub route: Option<Route>,
    pub summary: String,
    pub scores: Option<NoveltyScores>,
    /// True when an expected upstream artifact was missing or its stage
    /// failed, and the report was composed from partial inputs.
    pub degraded: bool,
    pub composed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RunRecord
// ---------------------------------------------------------------------------

/// The canonical document for one pipeline run, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub input: RunInput,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Keys are exactly the stages of the static topology, seeded PENDING
    /// at creation; bypassed stages are marked SKIPPED, never removed.
    pub stages: BTreeMap<StageName, StageState>,
    /// Raw stage outputs, keyed by stage. Populated iff that stage FINISHED.
    pub artifacts: BTreeMap<StageName, Value>,
    pub errors: Vec<RunError>,
    pub logs: Vec<String>,
    pub report: Option<Report>,
}

impl RunRecord {
    /// Seed a fresh record: PENDING overall, every stage PENDING.
    pub fn new(id: Uuid, input: RunInput, now: DateTime<Utc>) -> Self {
        let stages = StageName::ALL
            .iter()
            .map(|s| (*s, StageState::pending()))
            .collect();
        Self {
            id,
            input,
            status: RunStatus::Pending,
            created_at: now,
            updated_at: now,
            stages,
            artifacts: BTreeMap::new(),
            errors: Vec::new(),
            logs: Vec::new(),
            report: None,
        }
    }

    /// Merge a patch into the record.
    ///
    /// Logs and errors are append-only. Stage and run statuses are
    /// monotonic: a patch that would move a terminal status is ignored
    /// with a warning, since the executor is the only writer and such a
    /// transition indicates a sequencing bug upstream.
    pub fn apply(&mut self, patch: RunPatch, now: DateTime<Utc>) {
        for transition in patch.stages {
            let Some(state) = self.stages.get_mut(&transition.stage) else {
                continue;
            };
            if state.status.is_terminal() && state.status != transition.status {
                tracing::warn!(
                    run_id = %self.id,
                    stage = transition.stage.as_str(),
                    from = state.status.as_str(),
                    to = transition.status.as_str(),
                    "ignoring stage status regression"
                );
                continue;
            }
            if transition.status == StageStatus::Running && state.started_at.is_none() {
                state.started_at = Some(now);
            }
            if transition.status.is_terminal() {
                state.finished_at = Some(now);
            }
            state.status = transition.status;
        }

        for (stage, artifact) in patch.artifacts {
            self.artifacts.insert(stage, artifact);
        }
        self.logs.extend(patch.logs);
        self.errors.extend(patch.errors);

        if let Some(status) = patch.run_status {
            if self.status.is_terminal() && status != self.status {
                tracing::warn!(
                    run_id = %self.id,
                    from = self.status.as_str(),
                    to = status.as_str(),
                    "ignoring run status regression"
                );
            } else {
                self.status = status;
            }
        }
        if let Some(report) = patch.report {
            self.report = Some(report);
        }

        self.updated_at = now;
    }

    pub fn stage_status(&self, stage: StageName) -> StageStatus {
        self.stages
            .get(&stage)
            .map(|s| s.status)
            .unwrap_or(StageStatus::Pending)
    }

    pub fn artifact(&self, stage: StageName) -> Option<&Value> {
        self.artifacts.get(&stage)
    }

    /// Condensed status projection, safe for polling clients.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.id,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            report: self.report.clone(),
        }
    }
}

/// Condensed projection of a run: status plus report once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub report: Option<Report>,
}

// ---------------------------------------------------------------------------
// RunPatch
// ---------------------------------------------------------------------------

/// One stage status transition within a patch.
#[derive(Debug, Clone)]
pub struct StageTransition {
    pub stage: StageName,
    pub status: StageStatus,
}

/// A delta to merge into a run record. Built by the executor after each
/// transition and applied atomically by the run store.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub run_status: Option<RunStatus>,
    pub stages: Vec<StageTransition>,
    pub artifacts: Vec<(StageName, Value)>,
    pub logs: Vec<String>,
    pub errors: Vec<RunError>,
    pub report: Option<Report>,
}

impl RunPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_status(mut self, status: RunStatus) -> Self {
        self.run_status = Some(status);
        self
    }

    pub fn stage(mut self, stage: StageName, status: StageStatus) -> Self {
        self.stages.push(StageTransition { stage, status });
        self
    }

    pub fn artifact(mut self, stage: StageName, value: Value) -> Self {
        self.artifacts.push((stage, value));
        self
    }

    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn error(mut self, stage: StageName, message: impl Into<String>) -> Self {
        self.errors.push(RunError {
            stage,
            message: message.into(),
            at: Utc::now(),
        });
        self
    }

    pub fn report(mut self, report: Report) -> Self {
        self.report = Some(report);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.run_status.is_none()
            && self.stages.is_empty()
            && self.artifacts.is_empty()
            && self.logs.is_empty()
            && self.errors.is_empty()
            && self.report.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
