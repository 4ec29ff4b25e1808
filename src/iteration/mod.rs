//! Incremental re-harvesting
//!
//! Each pass over a crawl's target set is an iteration. Fingerprints
//! recorded per iteration decide what later passes must re-fetch and how
//! passes differ.

pub mod errors;
pub mod fingerprint;
pub mod manager;
pub mod storage;
pub mod types;

pub use errors::IterationError;
pub use manager::IterationManager;
pub use types::{
    ChangeType, CrawlDecision, DocumentFingerprint, IterationComparison, IterationMetadata,
    IterationMode, IterationStatistics, RecordOutcome,
};
