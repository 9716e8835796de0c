//! Ingestion stage: resolve the document reference and stage its text.
//!
//! Downstream stages read the manuscript text from this stage's artifact;
//! artifacts are the only channel between stages.

use serde_json::json;

use crate::pipeline::contract::{Stage, StageContext, StageDelta, StageOutput};
use crate::pipeline::types::StageName;
use crate::provider::DocumentProvider;

const PREVIEW_CHARS: usize = 200;

pub struct IngestionStage {
    provider: Box<dyn DocumentProvider>,
}

impl IngestionStage {
    pub fn new(provider: Box<dyn DocumentProvider>) -> Self {
        Self { provider }
    }
}

impl Stage for IngestionStage {
    fn name(&self) -> StageName {
        StageName::Ingestion
    }

    fn execute(&self, ctx: &StageContext<'_>) -> StageOutput {
        let reference = ctx.doc_uri();

        let content = match self.provider.fetch(reference) {
            Ok(content) => content,
            Err(e) => {
                return StageOutput::fail(format!("document fetch failed: {e}"));
            }
        };

        if ctx.cancel.is_cancelled() {
            return StageOutput::fail("ingestion cancelled");
        }

        let text = String::from_utf8_lossy(&content.bytes).into_owned();
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();

        let artifact = json!({
            "source": reference,
            "content_type": content.content_type,
            "chars": text.chars().count(),
            "text": text,
            "preview": preview,
        });

        StageOutput::ok(
            StageDelta::with_artifact(artifact)
                .log(format!("ingested {} bytes from {reference}", content.bytes.len())),
        )
    }
}
