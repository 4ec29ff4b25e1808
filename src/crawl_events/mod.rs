//! Event system for tracking and reporting crawl progress
//!
//! This module provides the event bus used to publish lifecycle, progress and
//! error events, with per-crawl and global bounded histories.

// Sub-modules
pub mod bus;
pub mod config;
pub mod errors;
pub mod history;
pub mod metrics;
pub mod streaming;
pub mod types;

// Re-exports for public API
pub use bus::CrawlEventBus;
pub use config::EventBusConfig;
pub use errors::EventBusError;
pub use history::EventHistory;
pub use metrics::{EventBusMetrics, MetricsSnapshot};
pub use streaming::EventReceiver;
pub use types::{CrawlEvent, EventType, HistoryQuery, SubscriptionId, SubscriptionScope};
