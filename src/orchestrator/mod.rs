//! Job orchestration
//!
//! [`HarvestContext`] holds the shared services. [`Orchestrator`] owns one
//! state machine and metrics collector per job, drives it through the
//! stage plan via a [`HarvestPipeline`], and triggers checkpoints on
//! cadence, pause and error.

pub mod context;
pub mod errors;
pub mod handle;
pub mod job;
pub mod manager;
pub mod pipeline;

pub use context::HarvestContext;
pub use errors::OrchestratorError;
pub use handle::StageHandle;
pub use job::{CrawlJob, JobSpec, JobStatus, RunSignal};
pub use manager::Orchestrator;
pub use pipeline::{HarvestPipeline, NoOpPipeline};
