//! Error types for job orchestration

use std::time::Duration;

use crate::checkpoint::CheckpointError;
use crate::crawl_events::EventBusError;
use crate::crawl_state::{CrawlState, CrawlSubstate, StateError};
use crate::iteration::IterationError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Crawl {0} not found")]
    JobNotFound(String),

    #[error("Crawl {0} already exists")]
    JobExists(String),

    /// Request rejected for the job's current state
    #[error("Cannot {operation} crawl {crawl_id} while it is {state}")]
    InvalidState {
        crawl_id: String,
        state: CrawlState,
        operation: &'static str,
    },

    #[error("Crawl {0} is already executing")]
    AlreadyExecuting(String),

    #[error("Crawl {0} was cancelled")]
    Cancelled(String),

    #[error("Stage {substate} exceeded its soft timeout of {}s", after.as_secs())]
    Timeout {
        substate: CrawlSubstate,
        after: Duration,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Iteration(#[from] IterationError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),
}
