//! Event type definitions for the crawl event system
//!
//! Every event carries the same envelope (`event_id`, `crawl_id`,
//! `event_type`, `timestamp`, `data`, `metadata`) so push channels can forward
//! payloads verbatim as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::errors::EventBusError;

/// Closed set of event kinds published on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StateChange,
    SubstateChange,
    ProgressUpdate,
    MilestoneReached,

    DocumentFound,
    DocumentDownloaded,
    DocumentProcessed,

    ExtractionStarted,
    ExtractionComplete,
    ExtractionFailed,

    QualityAssessed,

    PageCrawled,
    PageFailed,

    CheckpointCreated,
    IterationStarted,
    IterationCompleted,

    Error,
    Warning,
    MetricsUpdate,

    CrawlPaused,
    CrawlResumed,
    CrawlCancelled,
    CrawlCompleted,
}

impl EventType {
    /// Wire name, identical to the serde representation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateChange => "state_change",
            Self::SubstateChange => "substate_change",
            Self::ProgressUpdate => "progress_update",
            Self::MilestoneReached => "milestone_reached",
            Self::DocumentFound => "document_found",
            Self::DocumentDownloaded => "document_downloaded",
            Self::DocumentProcessed => "document_processed",
            Self::ExtractionStarted => "extraction_started",
            Self::ExtractionComplete => "extraction_complete",
            Self::ExtractionFailed => "extraction_failed",
            Self::QualityAssessed => "quality_assessed",
            Self::PageCrawled => "page_crawled",
            Self::PageFailed => "page_failed",
            Self::CheckpointCreated => "checkpoint_created",
            Self::IterationStarted => "iteration_started",
            Self::IterationCompleted => "iteration_completed",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::MetricsUpdate => "metrics_update",
            Self::CrawlPaused => "crawl_paused",
            Self::CrawlResumed => "crawl_resumed",
            Self::CrawlCancelled => "crawl_cancelled",
            Self::CrawlCompleted => "crawl_completed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event record, published exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlEvent {
    pub event_id: String,
    pub crawl_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Unwrap a `json!` object literal into its map
fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl CrawlEvent {
    /// Create an event with a fresh id and the current timestamp
    #[must_use]
    pub fn new(crawl_id: impl Into<String>, event_type: EventType, data: Map<String, Value>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            crawl_id: crawl_id.into(),
            event_type,
            timestamp: Utc::now(),
            data,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Main lifecycle transition
    #[must_use]
    pub fn state_change(
        crawl_id: &str,
        from_state: &str,
        to_state: &str,
        duration_seconds: f64,
        metadata: Map<String, Value>,
    ) -> Self {
        Self::new(
            crawl_id,
            EventType::StateChange,
            object(json!({
                "from_state": from_state,
                "to_state": to_state,
                "duration_seconds": duration_seconds,
            })),
        )
        .with_metadata(metadata)
    }

    /// Substate change within the current main state
    #[must_use]
    pub fn substate_change(
        crawl_id: &str,
        state: &str,
        from_substate: Option<&str>,
        to_substate: &str,
        prior_duration_seconds: Option<f64>,
    ) -> Self {
        Self::new(
            crawl_id,
            EventType::SubstateChange,
            object(json!({
                "state": state,
                "from_substate": from_substate,
                "to_substate": to_substate,
                "prior_duration_seconds": prior_duration_seconds,
            })),
        )
    }

    #[must_use]
    pub fn progress_update(
        crawl_id: &str,
        category: &str,
        completed: u64,
        failed: u64,
        total: u64,
        percentage: f64,
    ) -> Self {
        Self::new(
            crawl_id,
            EventType::ProgressUpdate,
            object(json!({
                "category": category,
                "completed": completed,
                "failed": failed,
                "total": total,
                "percentage": percentage,
            })),
        )
    }

    #[must_use]
    pub fn milestone(crawl_id: &str, milestone: &str, value: u64) -> Self {
        Self::new(
            crawl_id,
            EventType::MilestoneReached,
            object(json!({ "milestone": milestone, "value": value })),
        )
    }

    #[must_use]
    pub fn page_crawled(crawl_id: &str, url: &str) -> Self {
        Self::new(crawl_id, EventType::PageCrawled, object(json!({ "url": url })))
    }

    #[must_use]
    pub fn page_failed(crawl_id: &str, url: &str, reason: &str) -> Self {
        Self::new(
            crawl_id,
            EventType::PageFailed,
            object(json!({ "url": url, "reason": reason })),
        )
    }

    #[must_use]
    pub fn document_found(crawl_id: &str, url: &str) -> Self {
        Self::new(crawl_id, EventType::DocumentFound, object(json!({ "url": url })))
    }

    #[must_use]
    pub fn document_downloaded(crawl_id: &str, url: &str, size_bytes: u64) -> Self {
        Self::new(
            crawl_id,
            EventType::DocumentDownloaded,
            object(json!({ "url": url, "size_bytes": size_bytes })),
        )
    }

    #[must_use]
    pub fn document_processed(crawl_id: &str, url: &str) -> Self {
        Self::new(crawl_id, EventType::DocumentProcessed, object(json!({ "url": url })))
    }

    #[must_use]
    pub fn extraction(crawl_id: &str, event_type: EventType, url: &str, detail: Option<&str>) -> Self {
        Self::new(
            crawl_id,
            event_type,
            object(json!({ "url": url, "detail": detail })),
        )
    }

    #[must_use]
    pub fn quality_assessed(crawl_id: &str, url: &str, score: f64, passed: bool) -> Self {
        Self::new(
            crawl_id,
            EventType::QualityAssessed,
            object(json!({ "url": url, "score": score, "passed": passed })),
        )
    }

    #[must_use]
    pub fn checkpoint_created(crawl_id: &str, checkpoint_id: &str, checkpoint_type: &str) -> Self {
        Self::new(
            crawl_id,
            EventType::CheckpointCreated,
            object(json!({
                "checkpoint_id": checkpoint_id,
                "checkpoint_type": checkpoint_type,
            })),
        )
    }

    #[must_use]
    pub fn iteration_started(crawl_id: &str, iteration_id: &str, mode: &str) -> Self {
        Self::new(
            crawl_id,
            EventType::IterationStarted,
            object(json!({ "iteration_id": iteration_id, "mode": mode })),
        )
    }

    #[must_use]
    pub fn iteration_completed(crawl_id: &str, iteration_id: &str, stats: Value) -> Self {
        Self::new(
            crawl_id,
            EventType::IterationCompleted,
            object(json!({ "iteration_id": iteration_id, "stats": stats })),
        )
    }

    #[must_use]
    pub fn error(crawl_id: &str, message: &str, context: Option<&str>) -> Self {
        Self::new(
            crawl_id,
            EventType::Error,
            object(json!({ "message": message, "context": context })),
        )
    }

    #[must_use]
    pub fn warning(crawl_id: &str, message: &str) -> Self {
        Self::new(crawl_id, EventType::Warning, object(json!({ "message": message })))
    }

    #[must_use]
    pub fn metrics_update(crawl_id: &str, snapshot: Value) -> Self {
        Self::new(
            crawl_id,
            EventType::MetricsUpdate,
            object(json!({ "metrics": snapshot })),
        )
    }

    #[must_use]
    pub fn crawl_paused(crawl_id: &str, checkpoint_id: Option<&str>) -> Self {
        Self::new(
            crawl_id,
            EventType::CrawlPaused,
            object(json!({ "checkpoint_id": checkpoint_id })),
        )
    }

    #[must_use]
    pub fn crawl_resumed(crawl_id: &str, resumed_state: &str) -> Self {
        Self::new(
            crawl_id,
            EventType::CrawlResumed,
            object(json!({ "resumed_state": resumed_state })),
        )
    }

    #[must_use]
    pub fn crawl_cancelled(crawl_id: &str, from_state: &str) -> Self {
        Self::new(
            crawl_id,
            EventType::CrawlCancelled,
            object(json!({ "from_state": from_state })),
        )
    }

    #[must_use]
    pub fn crawl_completed(crawl_id: &str, duration_seconds: f64, items_processed: u64) -> Self {
        Self::new(
            crawl_id,
            EventType::CrawlCompleted,
            object(json!({
                "duration_seconds": duration_seconds,
                "items_processed": items_processed,
            })),
        )
    }

    /// Serialize to the wire shape
    ///
    /// # Errors
    ///
    /// Returns `EventBusError::Serialization` if a data value cannot be encoded.
    pub fn to_json(&self) -> Result<String, EventBusError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an event from its wire shape
    ///
    /// # Errors
    ///
    /// Returns `EventBusError::Serialization` on malformed input or an
    /// unknown `event_type`.
    pub fn from_json(raw: &str) -> Result<Self, EventBusError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Which events a subscription receives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionScope {
    /// Events of a single crawl
    Crawl(String),
    /// Every event on the bus
    All,
}

impl SubscriptionScope {
    #[must_use]
    pub fn crawl(crawl_id: impl Into<String>) -> Self {
        Self::Crawl(crawl_id.into())
    }

    #[must_use]
    pub fn matches(&self, event: &CrawlEvent) -> bool {
        match self {
            Self::Crawl(id) => *id == event.crawl_id,
            Self::All => true,
        }
    }
}

/// Handle identifying one subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Filter applied to history queries
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Maximum number of events returned (most recent kept)
    pub limit: usize,
    pub event_type: Option<EventType>,
    /// Only events with `timestamp >= since`
    pub since: Option<DateTime<Utc>>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            event_type: None,
            since: None,
        }
    }
}

impl HistoryQuery {
    #[must_use]
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}
