//! Terminal report composition.
//!
//! The aggregator folds whatever artifacts are present into one
//! client-facing report. It is total: every combination of present,
//! absent, and failed upstream stages yields a report — inconsistencies
//! degrade the verdict to UNDETERMINED and add an error entry, they never
//! crash the run.

use chrono::Utc;

use super::types::{
    NoveltyScores, Report, Route, RunError, RunRecord, StageName, StageStatus, Verdict,
};

/// Policy for folding classification route and novelty sub-scores into a
/// final verdict. The exact merge formula is deployment-specific, so it
/// is injected rather than hard-coded.
pub trait VerdictPolicy: Send + Sync {
    fn verdict(&self, route: Option<Route>, scores: Option<&NoveltyScores>) -> Verdict;
}

/// Default policy: weighted average of the novelty sub-scores, gated by
/// the route.
///
/// - `present` with scores: average ≥ `novel_threshold` → NOVEL,
///   < `not_novel_threshold` → NOT_NOVEL, else UNDETERMINED.
/// - `present` without scores (scoring failed): UNDETERMINED.
/// - `absent`: NOT_NOVEL — nothing was disclosed to assess.
/// - `implied` or no route: UNDETERMINED.
pub struct WeightedAverage {
    /// Weights for originality, prior-art distance, claim strength.
    pub weights: [f64; 3],
    pub novel_threshold: f64,
    pub not_novel_threshold: f64,
}

impl Default for WeightedAverage {
    fn default() -> Self {
        Self {
            weights: [0.4, 0.4, 0.2],
            novel_threshold: 0.6,
            not_novel_threshold: 0.4,
        }
    }
}

impl WeightedAverage {
    fn combined(&self, scores: &NoveltyScores) -> f64 {
        let [w_orig, w_dist, w_claim] = self.weights;
        let total = (w_orig + w_dist + w_claim).max(f64::EPSILON);
        (scores.originality * w_orig
            + scores.prior_art_distance * w_dist
            + scores.claim_strength * w_claim)
            / total
    }
}

impl VerdictPolicy for WeightedAverage {
    fn verdict(&self, route: Option<Route>, scores: Option<&NoveltyScores>) -> Verdict {
        match route {
            Some(Route::Present) => match scores {
                Some(scores) => {
                    let combined = self.combined(scores);
                    if combined >= self.novel_threshold {
                        Verdict::Novel
                    } else if combined < self.not_novel_threshold {
                        Verdict::NotNovel
                    } else {
                        Verdict::Undetermined
                    }
                }
                None => Verdict::Undetermined,
            },
            Some(Route::Absent) => Verdict::NotNovel,
            Some(Route::Implied) | None => Verdict::Undetermined,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// A composed report plus any inconsistencies discovered while composing.
pub struct Composition {
    pub report: Report,
    pub errors: Vec<RunError>,
}

pub struct Aggregator {
    policy: Box<dyn VerdictPolicy>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Box::new(WeightedAverage::default()))
    }
}

impl Aggregator {
    pub fn new(policy: Box<dyn VerdictPolicy>) -> Self {
        Self { policy }
    }

    /// Compose the terminal report from whatever the record holds.
    pub fn compose(&self, record: &RunRecord) -> Composition {
        let mut errors = Vec::new();
        let mut degraded = false;

        let (route, summary) = match record.artifact(StageName::Classification) {
            Some(artifact) => {
                let label = artifact.get("label").and_then(|v| v.as_str());
                let route = label.and_then(Route::parse);
                if route.is_none() {
                    degraded = true;
                    errors.push(RunError {
                        stage: StageName::Aggregation,
                        message: format!(
                            "classification label not in route set: {:?}",
                            label.unwrap_or("<missing>")
                        ),
                        at: Utc::now(),
                    });
                }
                let summary = artifact
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                (route, summary)
            }
            None => {
                degraded = true;
                (None, "classification unavailable".to_string())
            }
        };

        let scores = match record.stage_status(StageName::Novelty) {
            StageStatus::Finished => {
                let parsed = record
                    .artifact(StageName::Novelty)
                    .and_then(|a| a.get("scores"))
                    .and_then(|v| serde_json::from_value::<NoveltyScores>(v.clone()).ok());
                if parsed.is_none() {
                    degraded = true;
                    errors.push(RunError {
                        stage: StageName::Aggregation,
                        message: "novelty artifact missing or malformed".to_string(),
                        at: Utc::now(),
                    });
                }
                parsed
            }
            // Skipped by routing: expected, report from classification alone.
            StageStatus::Skipped => None,
            StageStatus::Failed => {
                degraded = true;
                None
            }
            StageStatus::Pending | StageStatus::Running => {
                degraded = true;
                None
            }
        };

        if record.stage_status(StageName::Ingestion) == StageStatus::Failed
            || record.stage_status(StageName::Classification) == StageStatus::Failed
        {
            degraded = true;
        }

        let verdict = self.policy.verdict(route, scores.as_ref());

        Composition {
            report: Report {
                verdict,
                route,
                summary,
                scores,
                degraded,
                composed_at: Utc::now(),
            },
            errors,
        }
    }
}
