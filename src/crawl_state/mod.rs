//! Job lifecycle tracking
//!
//! One `CrawlStateMachine` per job owns its state, substate, progress
//! counters and transition history.

pub mod errors;
pub mod machine;
pub mod types;

pub use errors::StateError;
pub use machine::CrawlStateMachine;
pub use types::{
    CrawlProgress, CrawlState, CrawlStateData, CrawlSubstate, ProgressCategory, ProgressSummary,
    StateSummary, StateTransition,
};
