//! Subscription operations for the CrawlEventBus

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use crate::crawl_events::errors::EventBusError;
use crate::crawl_events::metrics::EventBusMetrics;
use crate::crawl_events::streaming::EventReceiver;
use crate::crawl_events::types::{CrawlEvent, SubscriptionId, SubscriptionScope};

use super::core::{CrawlEventBus, Subscriber};

impl CrawlEventBus {
    /// Subscribe a callback to events within `scope`
    ///
    /// The callback runs on a dedicated worker task that drains this
    /// subscriber's queue in order. An `Err` or a panic from the callback is
    /// logged and counted; the worker keeps going and neither the publisher
    /// nor other subscribers are affected.
    ///
    /// # Errors
    /// * `EventBusError::Shutdown` - The bus has been shut down
    /// * `EventBusError::NoRuntime` - Called outside a Tokio runtime
    pub fn subscribe<F>(
        &self,
        scope: SubscriptionScope,
        callback: F,
    ) -> Result<SubscriptionId, EventBusError>
    where
        F: Fn(&CrawlEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if self.is_shutdown() {
            return Err(EventBusError::Shutdown);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| EventBusError::NoRuntime)?;

        let id = self.allocate_id();
        let (sender, receiver) = mpsc::channel(self.config.subscriber_queue_capacity);
        let worker = runtime.spawn(run_worker(
            id,
            receiver,
            callback,
            self.metrics.clone(),
            self.config.enable_metrics,
        ));

        self.register(
            id,
            Subscriber {
                scope,
                sender,
                worker: Some(worker),
            },
        );
        Ok(id)
    }

    /// Subscribe with a pull-style receiver instead of a callback
    ///
    /// Suited to push-channel consumers that forward events elsewhere. The
    /// subscription is removed when the receiver is dropped and the next
    /// matching publish finds the closed queue, or explicitly via
    /// `unsubscribe`.
    ///
    /// # Errors
    /// * `EventBusError::Shutdown` - The bus has been shut down
    pub fn subscribe_receiver(
        &self,
        scope: SubscriptionScope,
    ) -> Result<EventReceiver, EventBusError> {
        if self.is_shutdown() {
            return Err(EventBusError::Shutdown);
        }
        let id = self.allocate_id();
        let (sender, receiver) = mpsc::channel(self.config.subscriber_queue_capacity);
        self.register(
            id,
            Subscriber {
                scope,
                sender,
                worker: None,
            },
        );
        Ok(EventReceiver::new(id, receiver))
    }

    /// Remove a subscription
    ///
    /// Events already queued for a callback subscriber are still delivered.
    ///
    /// # Errors
    /// * `EventBusError::SubscriptionNotFound` - Unknown or already removed id
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EventBusError> {
        let removed = self.subscribers.write().remove(&id);
        match removed {
            Some(_) => {
                self.refresh_subscriber_count();
                log::debug!("Removed subscription {id}");
                Ok(())
            }
            None => Err(EventBusError::SubscriptionNotFound(id.to_string())),
        }
    }

    /// Get the number of active subscribers, pruning closed receivers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .write()
            .retain(|_, subscriber| !subscriber.sender.is_closed());
        self.refresh_subscriber_count()
    }

    /// Check if the event bus has any active subscribers
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::SeqCst))
    }

    fn register(&self, id: SubscriptionId, subscriber: Subscriber) {
        log::debug!("Registered subscription {id} for {:?}", subscriber.scope);
        self.subscribers.write().insert(id, subscriber);
        self.refresh_subscriber_count();
    }

    pub(super) fn refresh_subscriber_count(&self) -> usize {
        let count = self.subscribers.read().len();
        if self.config.enable_metrics {
            self.metrics.update_subscriber_count(count);
        }
        count
    }
}

async fn run_worker<F>(
    id: SubscriptionId,
    mut receiver: mpsc::Receiver<Arc<CrawlEvent>>,
    callback: F,
    metrics: EventBusMetrics,
    enable_metrics: bool,
) where
    F: Fn(&CrawlEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    while let Some(event) = receiver.recv().await {
        match std::panic::catch_unwind(AssertUnwindSafe(|| callback(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::warn!(
                    "Subscriber {id} failed on {} event {}: {e:#}",
                    event.event_type,
                    event.event_id
                );
                if enable_metrics {
                    metrics.increment_subscriber_failures();
                }
            }
            Err(_) => {
                log::warn!(
                    "Subscriber {id} panicked on {} event {}",
                    event.event_type,
                    event.event_id
                );
                if enable_metrics {
                    metrics.increment_subscriber_failures();
                }
            }
        }
    }
    log::debug!("Subscriber {id} worker finished");
}
