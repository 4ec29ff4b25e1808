//! Builder methods available for all states, plus derived paths and file
//! loading for `HarvestConfig`

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use super::builder::HarvestConfigBuilder;
use super::types::HarvestConfig;

impl<State> HarvestConfigBuilder<State> {
    #[must_use]
    pub fn checkpoint_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.config.checkpoint_subdir = subdir.into();
        self
    }

    #[must_use]
    pub fn iteration_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.config.iteration_subdir = subdir.into();
        self
    }

    /// Number of processed items between AUTO checkpoints
    ///
    /// Zero disables automatic checkpoints; PAUSE, MANUAL and ERROR
    /// checkpoints are still written.
    #[must_use]
    pub fn auto_checkpoint_interval(mut self, items: u64) -> Self {
        self.config.auto_checkpoint_interval = items;
        self
    }

    #[must_use]
    pub fn checkpoint_keep_last(mut self, keep: usize) -> Self {
        self.config.checkpoint_keep_last = keep;
        self
    }

    #[must_use]
    pub fn checkpoint_write_timeout_secs(mut self, secs: u64) -> Self {
        self.config.checkpoint_write_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn metric_series_capacity(mut self, capacity: usize) -> Self {
        self.config.metric_series_capacity = capacity;
        self
    }

    #[must_use]
    pub fn default_metrics_window_secs(mut self, secs: u64) -> Self {
        self.config.default_metrics_window_secs = secs;
        self
    }

    #[must_use]
    pub fn event_history_capacity(mut self, capacity: usize) -> Self {
        self.config.event_history_capacity = capacity;
        self
    }

    #[must_use]
    pub fn event_type_history_capacity(mut self, capacity: usize) -> Self {
        self.config.event_type_history_capacity = capacity;
        self
    }

    #[must_use]
    pub fn subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.subscriber_queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn enable_event_metrics(mut self, enabled: bool) -> Self {
        self.config.enable_event_metrics = enabled;
        self
    }

    #[must_use]
    pub fn substate_timeout_secs(mut self, secs: u64) -> Self {
        self.config.substate_timeout_secs = secs;
        self
    }
}

impl HarvestConfig {
    /// Load configuration from a JSON file
    ///
    /// Fields missing from the file fall back to their defaults. A relative
    /// `storage_dir` is resolved against the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: HarvestConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.storage_dir = std::path::absolute(&config.storage_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Directory holding one subdirectory of checkpoints per crawl
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.storage_dir.join(&self.checkpoint_subdir)
    }

    /// Directory holding iteration metadata and fingerprint maps
    #[must_use]
    pub fn iteration_dir(&self) -> PathBuf {
        self.storage_dir.join(&self.iteration_subdir)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.metric_series_capacity == 0 {
            bail!("metric_series_capacity must be greater than zero");
        }
        if self.event_history_capacity == 0 || self.event_type_history_capacity == 0 {
            bail!("event history capacities must be greater than zero");
        }
        if self.subscriber_queue_capacity == 0 {
            bail!("subscriber_queue_capacity must be greater than zero");
        }
        if self.substate_timeout_secs == 0 {
            bail!("substate_timeout_secs must be greater than zero");
        }
        if self.checkpoint_subdir.is_empty() || self.iteration_subdir.is_empty() {
            bail!("checkpoint and iteration subdirectories must be named");
        }
        Ok(())
    }
}
