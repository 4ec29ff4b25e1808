//! Getter methods for `HarvestConfig`

use std::path::PathBuf;
use std::time::Duration;

use super::types::HarvestConfig;

impl HarvestConfig {
    #[must_use]
    pub fn storage_dir(&self) -> &PathBuf {
        &self.storage_dir
    }

    #[must_use]
    pub fn auto_checkpoint_interval(&self) -> u64 {
        self.auto_checkpoint_interval
    }

    #[must_use]
    pub fn checkpoint_keep_last(&self) -> usize {
        self.checkpoint_keep_last
    }

    #[must_use]
    pub fn checkpoint_write_timeout(&self) -> Duration {
        Duration::from_secs(self.checkpoint_write_timeout_secs)
    }

    #[must_use]
    pub fn metric_series_capacity(&self) -> usize {
        self.metric_series_capacity
    }

    #[must_use]
    pub fn default_metrics_window_secs(&self) -> u64 {
        self.default_metrics_window_secs
    }

    #[must_use]
    pub fn event_history_capacity(&self) -> usize {
        self.event_history_capacity
    }

    #[must_use]
    pub fn event_type_history_capacity(&self) -> usize {
        self.event_type_history_capacity
    }

    #[must_use]
    pub fn subscriber_queue_capacity(&self) -> usize {
        self.subscriber_queue_capacity
    }

    #[must_use]
    pub fn enable_event_metrics(&self) -> bool {
        self.enable_event_metrics
    }

    #[must_use]
    pub fn substate_timeout(&self) -> Duration {
        Duration::from_secs(self.substate_timeout_secs)
    }
}
