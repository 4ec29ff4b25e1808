//! Shared configuration constants for harvest
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Auto checkpoint cadence: one AUTO checkpoint every 100 processed items
///
/// Bounds the amount of work lost on a crash to roughly one hundred pages
/// while keeping checkpoint I/O well below the fetch rate.
pub const DEFAULT_AUTO_CHECKPOINT_INTERVAL: u64 = 100;

/// Number of checkpoints retained per crawl after pruning
pub const DEFAULT_CHECKPOINT_KEEP_LAST: usize = 5;

/// Capacity of each metric time series (points)
///
/// At one sample per second this retains ~16 minutes of history, enough for
/// the default 5 minute aggregation window plus p99 headroom.
pub const DEFAULT_METRIC_SERIES_CAPACITY: usize = 1000;

/// Capacity of each event history ring (per crawl and global)
pub const DEFAULT_EVENT_HISTORY_CAPACITY: usize = 1000;

/// Retained events per event type when filtering history by type
pub const DEFAULT_EVENT_TYPE_HISTORY_CAPACITY: usize = 100;

/// Per-subscriber delivery queue depth
///
/// A subscriber that falls this far behind starts losing events; the
/// publisher never waits on it.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

/// Soft timeout for a single substate stage: 1 hour
pub const DEFAULT_SUBSTATE_TIMEOUT_SECS: u64 = 3600;

/// Timeout for blocking checkpoint compression + write
pub const DEFAULT_CHECKPOINT_WRITE_TIMEOUT_SECS: u64 = 30;

/// Default aggregation window for `get_aggregated_metrics`: 5 minutes
pub const DEFAULT_METRICS_WINDOW_SECS: u64 = 300;

/// Quality score at or above which a document passes curation
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

/// Gzip level for checkpoint blobs
///
/// Level 3 keeps compression fast on the blocking pool; checkpoint payloads
/// are dominated by URL strings which compress well at any level.
pub const CHECKPOINT_COMPRESSION_LEVEL: u32 = 3;
