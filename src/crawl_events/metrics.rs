use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Metrics for event bus operations using lock-free atomic operations.
///
/// All counters use `Ordering::SeqCst` for sequential consistency,
/// ensuring snapshot reads are coherent across all fields.
#[derive(Debug, Clone)]
pub struct EventBusMetrics {
    pub events_published: Arc<AtomicU64>,
    /// Successful enqueues onto subscriber queues
    pub events_delivered: Arc<AtomicU64>,
    /// Deliveries dropped because a subscriber queue was full or closed
    pub events_dropped: Arc<AtomicU64>,
    /// Callback invocations that returned an error or panicked
    pub subscriber_failures: Arc<AtomicU64>,
    pub active_subscribers: Arc<AtomicUsize>,
    pub peak_subscribers: Arc<AtomicUsize>,
}

impl EventBusMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events_published: Arc::new(AtomicU64::new(0)),
            events_delivered: Arc::new(AtomicU64::new(0)),
            events_dropped: Arc::new(AtomicU64::new(0)),
            subscriber_failures: Arc::new(AtomicU64::new(0)),
            active_subscribers: Arc::new(AtomicUsize::new(0)),
            peak_subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn increment_published(&self) {
        self.events_published.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_delivered(&self, count: u64) {
        self.events_delivered.fetch_add(count, Ordering::SeqCst);
    }

    pub fn increment_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_subscriber_failures(&self) {
        self.subscriber_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn update_subscriber_count(&self, count: usize) {
        self.active_subscribers.store(count, Ordering::SeqCst);
        let _ = self.peak_subscribers.fetch_max(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.events_published.load(Ordering::SeqCst),
            events_delivered: self.events_delivered.load(Ordering::SeqCst),
            events_dropped: self.events_dropped.load(Ordering::SeqCst),
            subscriber_failures: self.subscriber_failures.load(Ordering::SeqCst),
            active_subscribers: self.active_subscribers.load(Ordering::SeqCst),
            peak_subscribers: self.peak_subscribers.load(Ordering::SeqCst),
        }
    }
}

impl Default for EventBusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub subscriber_failures: u64,
    pub active_subscribers: usize,
    pub peak_subscribers: usize,
}

impl MetricsSnapshot {
    /// Fraction of attempted deliveries that reached a subscriber queue
    #[must_use]
    pub fn delivery_rate(&self) -> f64 {
        let attempted = self.events_delivered + self.events_dropped;
        if attempted == 0 {
            return 1.0;
        }
        self.events_delivered as f64 / attempted as f64
    }
}
