//! Error types for checkpoint operations

use std::time::Duration;

use crate::crawl_state::CrawlState;

/// Checkpoint failures
///
/// Callers start fresh on `NotFound` and must not trust the data on `Corrupt`.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint {0} not found")]
    NotFound(String),

    #[error("Checkpoint {checkpoint_id} is corrupt: {reason}")]
    Corrupt {
        checkpoint_id: String,
        reason: String,
    },

    #[error("Checkpoint {checkpoint_id} was taken in terminal state {state} and cannot be resumed")]
    NotResumable {
        checkpoint_id: String,
        state: CrawlState,
    },

    #[error("Crawl id {0:?} cannot be used as a checkpoint directory name")]
    InvalidCrawlId(String),

    #[error("Checkpoint write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("Checkpoint task failed: {0}")]
    TaskFailed(String),

    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    pub(crate) fn corrupt(checkpoint_id: &str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            checkpoint_id: checkpoint_id.to_string(),
            reason: reason.into(),
        }
    }
}
