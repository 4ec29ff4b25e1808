//! Configuration types for the event bus system

use crate::config::HarvestConfig;
use crate::utils::{
    DEFAULT_EVENT_HISTORY_CAPACITY, DEFAULT_EVENT_TYPE_HISTORY_CAPACITY,
    DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
};

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Events retained per crawl and in the global history
    pub history_capacity: usize,
    /// Events retained per event type within each history
    pub type_history_capacity: usize,
    /// Depth of each subscriber's delivery queue
    pub subscriber_queue_capacity: usize,
    /// Whether to enable event metrics collection
    pub enable_metrics: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_EVENT_HISTORY_CAPACITY,
            type_history_capacity: DEFAULT_EVENT_TYPE_HISTORY_CAPACITY,
            subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
            enable_metrics: true,
        }
    }
}

impl From<&HarvestConfig> for EventBusConfig {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            history_capacity: config.event_history_capacity(),
            type_history_capacity: config.event_type_history_capacity(),
            subscriber_queue_capacity: config.subscriber_queue_capacity(),
            enable_metrics: config.enable_event_metrics(),
        }
    }
}
