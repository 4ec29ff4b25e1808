//! Process-wide services shared by every job
//!
//! Built once at startup and handed to the orchestrator; nothing here is a
//! hidden global.

use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::CheckpointManager;
use crate::config::HarvestConfig;
use crate::crawl_events::{CrawlEventBus, EventBusConfig};
use crate::crawl_metrics::MetricsAggregator;
use crate::iteration::IterationManager;

use super::errors::OrchestratorError;

#[derive(Debug)]
pub struct HarvestContext {
    config: HarvestConfig,
    event_bus: Arc<CrawlEventBus>,
    metrics: Arc<MetricsAggregator>,
    checkpoints: Arc<CheckpointManager>,
    iterations: Arc<IterationManager>,
}

impl HarvestContext {
    /// Open storage and construct the shared services
    ///
    /// # Errors
    /// Returns an error if the checkpoint or iteration stores cannot be
    /// opened.
    pub fn init(config: HarvestConfig) -> Result<Self, OrchestratorError> {
        let event_bus = Arc::new(CrawlEventBus::with_config(EventBusConfig::from(&config)));
        let metrics = Arc::new(MetricsAggregator::new(config.metric_series_capacity()));
        let checkpoints = Arc::new(CheckpointManager::open(
            config.checkpoint_dir(),
            config.checkpoint_write_timeout(),
        )?);
        let iterations = Arc::new(IterationManager::open(config.iteration_dir())?);

        log::info!(
            "Harvest context ready (storage: {})",
            config.storage_dir().display()
        );
        Ok(Self {
            config,
            event_bus,
            metrics,
            checkpoints,
            iterations,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    #[must_use]
    pub fn event_bus(&self) -> &Arc<CrawlEventBus> {
        &self.event_bus
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    #[must_use]
    pub fn checkpoints(&self) -> &Arc<CheckpointManager> {
        &self.checkpoints
    }

    #[must_use]
    pub fn iterations(&self) -> &Arc<IterationManager> {
        &self.iterations
    }

    /// Close the event bus, letting subscribers drain queued events
    ///
    /// # Errors
    /// Returns `EventBusError::DrainTimeout` if workers are still busy after
    /// `drain_timeout`.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<(), OrchestratorError> {
        log::info!("Shutting down harvest context");
        self.event_bus.shutdown(drain_timeout).await?;
        Ok(())
    }
}
