//! Error types for lifecycle state operations

use super::types::{CrawlState, CrawlSubstate};

/// Caller misuse of the lifecycle graph; never retried
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: CrawlState, to: CrawlState },

    #[error("Substate {substate} does not belong to state {state}")]
    InvalidSubstate {
        state: CrawlState,
        substate: CrawlSubstate,
    },
}
