//! Bounded event history
//!
//! One `EventHistory` exists per crawl plus one global instance. Each keeps a
//! main ring of recent events and a smaller ring per event type so that rare
//! event types survive bursts of frequent ones.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{CrawlEvent, EventType, HistoryQuery};
use crate::utils::RingBuffer;

#[derive(Debug)]
pub struct EventHistory {
    events: RingBuffer<Arc<CrawlEvent>>,
    by_type: HashMap<EventType, RingBuffer<Arc<CrawlEvent>>>,
    type_capacity: usize,
}

impl EventHistory {
    #[must_use]
    pub fn new(capacity: usize, type_capacity: usize) -> Self {
        Self {
            events: RingBuffer::with_capacity(capacity),
            by_type: HashMap::new(),
            type_capacity,
        }
    }

    pub fn push(&mut self, event: Arc<CrawlEvent>) {
        let type_capacity = self.type_capacity;
        self.by_type
            .entry(event.event_type)
            .or_insert_with(|| RingBuffer::with_capacity(type_capacity))
            .push(Arc::clone(&event));
        self.events.push(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Up to `query.limit` most recent matching events, oldest first
    #[must_use]
    pub fn query(&self, query: &HistoryQuery) -> Vec<Arc<CrawlEvent>> {
        let source = match query.event_type {
            Some(event_type) => match self.by_type.get(&event_type) {
                Some(ring) => ring,
                None => return Vec::new(),
            },
            None => &self.events,
        };

        let mut selected: Vec<Arc<CrawlEvent>> = source
            .iter()
            .rev()
            .filter(|event| query.since.is_none_or(|since| event.timestamp >= since))
            .take(query.limit)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.by_type.clear();
    }
}
