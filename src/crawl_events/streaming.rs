//! Pull-style event receivers
//!
//! Wraps a subscriber queue for consumers that forward events to an outer
//! transport instead of handling them in a callback.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::errors::EventBusError;
use super::types::{CrawlEvent, EventType, SubscriptionId};

/// Receiving half of a subscription created with `subscribe_receiver`
#[derive(Debug)]
pub struct EventReceiver {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Arc<CrawlEvent>>,
}

impl EventReceiver {
    pub(crate) fn new(id: SubscriptionId, receiver: mpsc::Receiver<Arc<CrawlEvent>>) -> Self {
        Self { id, receiver }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next event
    ///
    /// # Returns
    /// * `Ok(event)` - Next event in publish order
    /// * `Err(EventBusError::Shutdown)` - Subscription removed or bus shut down
    ///   and the queue is drained
    pub async fn recv(&mut self) -> Result<Arc<CrawlEvent>, EventBusError> {
        self.receiver.recv().await.ok_or(EventBusError::Shutdown)
    }

    /// Receive the next event of one of the given types, skipping others
    pub async fn recv_filtered(
        &mut self,
        event_types: &[EventType],
    ) -> Result<Arc<CrawlEvent>, EventBusError> {
        loop {
            let event = self.recv().await?;
            if event_types.contains(&event.event_type) {
                return Ok(event);
            }
        }
    }

    /// Try to receive an already queued event without waiting
    ///
    /// # Returns
    /// * `Ok(Some(event))` - An event was queued
    /// * `Ok(None)` - Queue currently empty
    /// * `Err(EventBusError::Shutdown)` - Queue closed and drained
    pub fn try_recv(&mut self) -> Result<Option<Arc<CrawlEvent>>, EventBusError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EventBusError::Shutdown),
        }
    }
}
