//! Invention detection & classification stage.
//!
//! Wraps a `Classifier` and reports its label as the route outcome. The
//! bundled `KeywordClassifier` is rule-based (no model calls): explicit
//! disclosure cues map to `present`, softer novelty language to
//! `implied`, everything else to `absent`.

use serde_json::json;

use crate::pipeline::contract::{Stage, StageContext, StageDelta, StageOutput};
use crate::pipeline::types::StageName;

/// Classification result from the external collaborator. The label is a
/// free string at this boundary; the router validates it against the
/// closed route set.
#[derive(Debug, Clone)]
pub struct Classification {
    pub label: String,
    pub summary: String,
    pub signals: Vec<String>,
}

pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

// ---------------------------------------------------------------------------
// Rule-based classifier
// ---------------------------------------------------------------------------

/// Cue phrases that explicitly disclose an invention.
const STRONG_CUES: &[&str] = &[
    "we claim",
    "the invention",
    "our invention",
    "patent",
    "novel method",
    "novel apparatus",
    "embodiment",
];

/// Softer language suggesting an implied disclosure.
const WEAK_CUES: &[&str] = &[
    "we propose",
    "we introduce",
    "new approach",
    "novel",
    "for the first time",
];

pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();

        let strong: Vec<String> = STRONG_CUES
            .iter()
            .filter(|cue| lower.contains(*cue))
            .map(|cue| cue.to_string())
            .collect();
        let weak: Vec<String> = WEAK_CUES
            .iter()
            .filter(|cue| lower.contains(*cue))
            .map(|cue| cue.to_string())
            .collect();

        let (label, summary) = if !strong.is_empty() {
            (
                "present",
                format!(
                    "Explicit invention disclosure detected ({} strong cue(s))",
                    strong.len()
                ),
            )
        } else if !weak.is_empty() {
            (
                "implied",
                format!(
                    "Possible implied disclosure ({} weak cue(s), no explicit claim)",
                    weak.len()
                ),
            )
        } else {
            ("absent", "No invention disclosure language found".to_string())
        };

        let mut signals = strong;
        signals.extend(weak);

        Classification {
            label: label.to_string(),
            summary,
            signals,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage adapter
// ---------------------------------------------------------------------------

pub struct ClassificationStage {
    classifier: Box<dyn Classifier>,
}

impl ClassificationStage {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }
}

impl Stage for ClassificationStage {
    fn name(&self) -> StageName {
        StageName::Classification
    }

    fn execute(&self, ctx: &StageContext<'_>) -> StageOutput {
        let Some(text) = ctx
            .artifact(StageName::Ingestion)
            .and_then(|a| a.get("text"))
            .and_then(|t| t.as_str())
        else {
            return StageOutput::fail("no ingested text available for classification");
        };

        let result = self.classifier.classify(text);

        let artifact = json!({
            "label": result.label,
            "summary": result.summary,
            "signals": result.signals,
        });

        let delta = StageDelta::with_artifact(artifact).log(format!(
            "classification label: {} ({} signal(s))",
            result.label,
            result.signals.len()
        ));

        StageOutput::routed(delta, result.label)
    }
}
