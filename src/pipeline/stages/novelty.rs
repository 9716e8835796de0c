//! Novelty assessment stage. Only invoked when classification routed
//! `present`.
//!
//! The bundled `HeuristicScorer` derives deterministic sub-scores from
//! text statistics; a real prior-art search backend implements the same
//! `NoveltyScorer` trait.

use serde_json::json;
use thiserror::Error;

use crate::pipeline::contract::{Stage, StageContext, StageDelta, StageOutput};
use crate::pipeline::types::{NoveltyScores, StageName};

#[derive(Debug, Error)]
#[error("scoring failed: {0}")]
pub struct ScoringError(pub String);

pub trait NoveltyScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<NoveltyScores, ScoringError>;
}

// ---------------------------------------------------------------------------
// Heuristic scorer
// ---------------------------------------------------------------------------

pub struct HeuristicScorer;

impl NoveltyScorer for HeuristicScorer {
    fn score(&self, text: &str) -> Result<NoveltyScores, ScoringError> {
        if text.trim().is_empty() {
            return Err(ScoringError("empty manuscript text".into()));
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        let unique: std::collections::HashSet<String> =
            words.iter().map(|w| w.to_lowercase()).collect();

        // Vocabulary richness as a crude originality proxy.
        let originality = clamp(unique.len() as f64 / words.len().max(1) as f64);

        // Dense bracketed citations suggest closeness to prior art.
        let citation_markers = text.matches('[').count();
        let prior_art_distance = clamp(1.0 - citation_markers as f64 / 50.0);

        // Assertive disclosure language strengthens the claim signal.
        let lower = text.to_lowercase();
        let cues = ["we claim", "novel", "invention", "first"]
            .iter()
            .filter(|cue| lower.contains(*cue))
            .count();
        let claim_strength = clamp(cues as f64 * 0.25);

        Ok(NoveltyScores {
            originality,
            prior_art_distance,
            claim_strength,
        })
    }
}

fn clamp(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Stage adapter
// ---------------------------------------------------------------------------

pub struct NoveltyStage {
    scorer: Box<dyn NoveltyScorer>,
}

impl NoveltyStage {
    pub fn new(scorer: Box<dyn NoveltyScorer>) -> Self {
        Self { scorer }
    }
}

impl Stage for NoveltyStage {
    fn name(&self) -> StageName {
        StageName::Novelty
    }

    fn execute(&self, ctx: &StageContext<'_>) -> StageOutput {
        let Some(text) = ctx
            .artifact(StageName::Ingestion)
            .and_then(|a| a.get("text"))
            .and_then(|t| t.as_str())
        else {
            return StageOutput::fail("no ingested text available for scoring");
        };

        if ctx.cancel.is_cancelled() {
            return StageOutput::fail("novelty assessment cancelled");
        }

        match self.scorer.score(text) {
            Ok(scores) => {
                let line = format!(
                    "novelty sub-scores: originality={:.2} prior_art_distance={:.2} claim_strength={:.2}",
                    scores.originality, scores.prior_art_distance, scores.claim_strength
                );
                let artifact = json!({
                    "scores": scores,
                    "basis": "heuristic",
                });
                StageOutput::ok(StageDelta::with_artifact(artifact).log(line))
            }
            Err(e) => StageOutput::fail(e.to_string()),
        }
    }
}
