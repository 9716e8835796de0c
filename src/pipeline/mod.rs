pub mod aggregator;
pub mod contract;
pub mod executor;
pub mod router;
pub mod stages;
pub mod types;

pub use aggregator::{Aggregator, VerdictPolicy, WeightedAverage};
pub use contract::{CancelFlag, Stage, StageContext, StageDelta, StageOutcome, StageOutput};
pub use executor::PipelineExecutor;
pub use types::{
    NoveltyScores, Report, Route, RunInput, RunPatch, RunRecord, RunStatus, RunSummary, StageName,
    StageStatus, Verdict,
};
