//! Error types for event bus operations

/// Error types for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// Event bus has been shut down; no further publishes or subscriptions
    #[error("Event bus shutdown")]
    Shutdown,

    /// Subscription id is unknown or was already removed
    #[error("Subscription {0} not found")]
    SubscriptionNotFound(String),

    /// Callback subscriptions need a Tokio runtime to host their worker
    #[error("No Tokio runtime available to run subscriber worker")]
    NoRuntime,

    /// Drain timeout during shutdown - some workers still processing
    #[error("Drain timeout: {pending_workers} subscriber workers still running")]
    DrainTimeout { pending_workers: usize },

    /// Event could not be encoded or decoded
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
