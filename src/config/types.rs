//! Core configuration types for harvest job coordination
//!
//! This module contains the `HarvestConfig` struct that parameterizes the
//! event bus, metrics engine, checkpoint store and iteration store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{
    DEFAULT_AUTO_CHECKPOINT_INTERVAL, DEFAULT_CHECKPOINT_KEEP_LAST,
    DEFAULT_CHECKPOINT_WRITE_TIMEOUT_SECS, DEFAULT_EVENT_HISTORY_CAPACITY,
    DEFAULT_EVENT_TYPE_HISTORY_CAPACITY, DEFAULT_METRIC_SERIES_CAPACITY,
    DEFAULT_METRICS_WINDOW_SECS, DEFAULT_SUBSCRIBER_QUEUE_CAPACITY, DEFAULT_SUBSTATE_TIMEOUT_SECS,
};

/// Main configuration struct for the harvest coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Root directory for all durable artifacts.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in builder).
    pub(crate) storage_dir: PathBuf,
    pub(crate) checkpoint_subdir: String,
    pub(crate) iteration_subdir: String,

    /// Processed items between AUTO checkpoints (0 disables them)
    pub(crate) auto_checkpoint_interval: u64,
    pub(crate) checkpoint_keep_last: usize,
    pub(crate) checkpoint_write_timeout_secs: u64,

    pub(crate) metric_series_capacity: usize,
    pub(crate) default_metrics_window_secs: u64,

    pub(crate) event_history_capacity: usize,
    pub(crate) event_type_history_capacity: usize,
    pub(crate) subscriber_queue_capacity: usize,
    pub(crate) enable_event_metrics: bool,

    /// Soft timeout applied to each substate stage
    pub(crate) substate_timeout_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("harvest_data"),
            checkpoint_subdir: "checkpoints".to_string(),
            iteration_subdir: "iterations".to_string(),
            auto_checkpoint_interval: DEFAULT_AUTO_CHECKPOINT_INTERVAL,
            checkpoint_keep_last: DEFAULT_CHECKPOINT_KEEP_LAST,
            checkpoint_write_timeout_secs: DEFAULT_CHECKPOINT_WRITE_TIMEOUT_SECS,
            metric_series_capacity: DEFAULT_METRIC_SERIES_CAPACITY,
            default_metrics_window_secs: DEFAULT_METRICS_WINDOW_SECS,
            event_history_capacity: DEFAULT_EVENT_HISTORY_CAPACITY,
            event_type_history_capacity: DEFAULT_EVENT_TYPE_HISTORY_CAPACITY,
            subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
            enable_event_metrics: true,
            substate_timeout_secs: DEFAULT_SUBSTATE_TIMEOUT_SECS,
        }
    }
}
