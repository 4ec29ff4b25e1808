//! Boundary to the external fetch/extract/process layer
//!
//! The orchestrator owns the lifecycle; a pipeline does the work of each
//! substate and reports it through the [`StageHandle`].

use futures::future::BoxFuture;

use super::handle::StageHandle;
use crate::crawl_state::CrawlSubstate;

/// Work performed for each substate of a job
///
/// A stage should call [`StageHandle::pause_point`] between units of work
/// so pauses take effect promptly. Stages are abandoned, not awaited, when
/// the job is cancelled.
pub trait HarvestPipeline: Send + Sync {
    fn run_stage<'a>(
        &'a self,
        handle: &'a StageHandle,
        substate: CrawlSubstate,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Pipeline whose stages complete immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPipeline;

impl HarvestPipeline for NoOpPipeline {
    fn run_stage<'a>(
        &'a self,
        _handle: &'a StageHandle,
        _substate: CrawlSubstate,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
