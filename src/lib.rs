//! Durable, conditionally-routed manuscript analysis pipeline.
//!
//! A submitted document flows through a static four-stage topology —
//! ingestion, invention classification, novelty assessment, aggregation —
//! with one conditional edge: the classifier's route label decides whether
//! the novelty stage runs or is skipped. Run state is persisted after
//! every transition, so clients can poll progress and survive restarts.

pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod provider;
pub mod store;

pub use error::PipelineError;
pub use lifecycle::PipelineService;
