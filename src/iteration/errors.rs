//! Error types for iteration operations

#[derive(Debug, thiserror::Error)]
pub enum IterationError {
    /// Incremental pass requested before any baseline exists
    #[error("Crawl {crawl_id} has no baseline iteration")]
    NoBaseline { crawl_id: String },

    #[error("Iteration {0} not found")]
    NotFound(String),

    /// Completed iterations are frozen
    #[error("Iteration {0} is already completed")]
    Completed(String),

    #[error("Iteration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Iteration serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
