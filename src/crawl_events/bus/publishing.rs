//! Publishing operations for the CrawlEventBus

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc::error::TrySendError;

use crate::crawl_events::errors::EventBusError;
use crate::crawl_events::types::{CrawlEvent, SubscriptionId};

use super::core::CrawlEventBus;

impl CrawlEventBus {
    /// Publish an event to all matching subscribers
    ///
    /// The event is appended to its crawl's history and enqueued for every
    /// subscriber whose scope matches while that crawl's history lock is
    /// held, so subscribers observe a crawl's events in publish order. The
    /// global history is appended afterwards.
    ///
    /// A subscriber whose queue is full misses this event; the miss is
    /// logged and counted, and other subscribers are unaffected. Receivers
    /// found closed are removed once the fan-out finishes.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of subscriber queues the event was placed on
    /// * `Err(EventBusError::Shutdown)` - The bus no longer accepts events
    pub fn publish(&self, event: CrawlEvent) -> Result<usize, EventBusError> {
        if self.shutdown_flag.load(Ordering::SeqCst) {
            return Err(EventBusError::Shutdown);
        }

        let event = Arc::new(event);
        let history = self.crawl_history(&event.crawl_id);

        let (delivered, closed) = {
            let mut history = history.lock();
            history.push(Arc::clone(&event));
            self.fan_out(&event)
        };

        self.global_history.lock().push(Arc::clone(&event));
        if !closed.is_empty() {
            self.remove_closed(&closed);
        }

        if self.config.enable_metrics {
            self.metrics.increment_published();
            self.metrics.add_delivered(delivered as u64);
        }

        Ok(delivered)
    }

    /// Returns the delivery count and the subscribers whose queue is closed
    fn fan_out(&self, event: &Arc<CrawlEvent>) -> (usize, Vec<SubscriptionId>) {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, subscriber) in subscribers.iter() {
            if !subscriber.scope.matches(event) {
                continue;
            }
            match subscriber.sender.try_send(Arc::clone(event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "Subscriber {id} queue full, dropping {} event for crawl {}",
                        event.event_type,
                        event.crawl_id
                    );
                    if self.config.enable_metrics {
                        self.metrics.increment_dropped();
                    }
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        (delivered, closed)
    }

    fn remove_closed(&self, closed: &[SubscriptionId]) {
        {
            let mut subscribers = self.subscribers.write();
            for id in closed {
                // Re-check under the write lock; the id may already be gone
                if subscribers.get(id).is_some_and(|s| s.sender.is_closed()) {
                    subscribers.remove(id);
                    log::debug!("Removed subscription {id} with closed queue");
                }
            }
        }
        self.refresh_subscriber_count();
    }
}
