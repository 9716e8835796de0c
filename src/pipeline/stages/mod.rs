//! Built-in stage implementations.
//!
//! Each stage is a swappable black box behind the `Stage` contract; the
//! executor only sees deltas and outcome tags. The bundled classifier and
//! scorer are rule-based placeholders — production deployments inject
//! model-backed implementations of the same traits.

pub mod classification;
pub mod ingestion;
pub mod novelty;

pub use classification::{Classification, ClassificationStage, Classifier, KeywordClassifier};
pub use ingestion::IngestionStage;
pub use novelty::{HeuristicScorer, NoveltyScorer, NoveltyStage, ScoringError};

use crate::provider::DocumentProvider;

use super::contract::Stage;

/// Build the standard stage set around a document provider: ingestion,
/// keyword classification, heuristic novelty scoring.
pub fn standard_stages(provider: Box<dyn DocumentProvider>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(IngestionStage::new(provider)),
        Box::new(ClassificationStage::new(Box::new(KeywordClassifier::new()))),
        Box::new(NoveltyStage::new(Box::new(HeuristicScorer))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::StageName;
    use crate::provider::StaticDocumentProvider;

    #[test]
    fn standard_stages_cover_the_routable_topology() {
        let stages = standard_stages(Box::new(StaticDocumentProvider::new()));
        let names: Vec<StageName> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                StageName::Ingestion,
                StageName::Classification,
                StageName::Novelty
            ]
        );
    }
}
