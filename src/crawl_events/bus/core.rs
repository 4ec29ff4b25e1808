//! Core CrawlEventBus struct definition and constructors

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::crawl_events::config::EventBusConfig;
use crate::crawl_events::history::EventHistory;
use crate::crawl_events::metrics::EventBusMetrics;
use crate::crawl_events::types::{CrawlEvent, SubscriptionId, SubscriptionScope};

/// One registered subscriber: its scope and the sending half of its queue
#[derive(Debug)]
pub(super) struct Subscriber {
    pub(super) scope: SubscriptionScope,
    pub(super) sender: mpsc::Sender<Arc<CrawlEvent>>,
    /// Worker draining the queue, absent for receiver-style subscriptions
    pub(super) worker: Option<JoinHandle<()>>,
}

/// Event bus for publishing and subscribing to crawl events
///
/// Each subscriber owns a bounded queue. `publish` only enqueues, so the
/// publisher never waits on subscriber processing.
#[derive(Debug)]
pub struct CrawlEventBus {
    pub(super) config: Arc<EventBusConfig>,
    pub(super) metrics: EventBusMetrics,
    pub(super) subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    /// Per-crawl histories, each independently locked
    pub(super) crawl_histories: DashMap<String, Arc<Mutex<EventHistory>>>,
    pub(super) global_history: Mutex<EventHistory>,
    pub(super) next_subscription_id: AtomicU64,
    pub(super) shutdown_flag: AtomicBool,
}

impl CrawlEventBus {
    /// Create a new event bus with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    ///
    /// # Arguments
    /// * `config` - Event bus configuration; a zero queue capacity is raised to 1
    #[must_use]
    pub fn with_config(mut config: EventBusConfig) -> Self {
        config.subscriber_queue_capacity = config.subscriber_queue_capacity.max(1);
        let global_history =
            EventHistory::new(config.history_capacity, config.type_history_capacity);
        Self {
            config: Arc::new(config),
            metrics: EventBusMetrics::new(),
            subscribers: RwLock::new(HashMap::new()),
            crawl_histories: DashMap::new(),
            global_history: Mutex::new(global_history),
            next_subscription_id: AtomicU64::new(1),
            shutdown_flag: AtomicBool::new(false),
        }
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Get current metrics
    ///
    /// Individual counter reads are atomic; use `metrics().snapshot()` for a
    /// coherent view across counters.
    #[must_use]
    pub fn metrics(&self) -> &EventBusMetrics {
        &self.metrics
    }

    /// History for one crawl, created on first use
    pub(super) fn crawl_history(&self, crawl_id: &str) -> Arc<Mutex<EventHistory>> {
        if let Some(history) = self.crawl_histories.get(crawl_id) {
            return Arc::clone(history.value());
        }
        let history = self
            .crawl_histories
            .entry(crawl_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(EventHistory::new(
                    self.config.history_capacity,
                    self.config.type_history_capacity,
                )))
            });
        Arc::clone(history.value())
    }
}
