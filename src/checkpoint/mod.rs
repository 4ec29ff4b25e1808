//! Checkpoint and resume
//!
//! A checkpoint is one gzip-compressed JSON payload plus an adjacent
//! plaintext metadata file, both written by temp-file-then-rename.

pub mod errors;
pub mod manager;
pub mod storage;
pub mod types;
pub mod validation;

pub use errors::CheckpointError;
pub use manager::CheckpointManager;
pub use types::{
    CheckpointData, CheckpointMetadata, CheckpointStatistics, CheckpointType, DocumentRef,
    FrontierSnapshot,
};
