//! One registered harvesting job

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};

use crate::checkpoint::{CheckpointMetadata, CheckpointType, FrontierSnapshot};
use crate::crawl_events::CrawlEvent;
use crate::crawl_metrics::{CollectorSnapshot, MetricsCollector};
use crate::crawl_state::{CrawlStateData, CrawlStateMachine, StateSummary};
use crate::iteration::IterationMode;

use super::context::HarvestContext;
use super::errors::OrchestratorError;

/// What the executor of a job should be doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSignal {
    Running,
    Paused,
    Cancelled,
}

/// Request to register a job
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub crawl_id: Option<String>,
    /// Caller configuration, stored in checkpoints and iterations verbatim
    pub config: Value,
    pub seed_urls: Vec<String>,
    /// Attach an iteration of this mode to the run
    pub iteration_mode: Option<IterationMode>,
}

impl JobSpec {
    #[must_use]
    pub fn new(config: Value) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_crawl_id(mut self, crawl_id: impl Into<String>) -> Self {
        self.crawl_id = Some(crawl_id.into());
        self
    }

    #[must_use]
    pub fn with_seed_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_iteration(mut self, mode: IterationMode) -> Self {
        self.iteration_mode = Some(mode);
        self
    }
}

/// Status view combining state, metrics and checkpoint info
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub state: StateSummary,
    pub signal: RunSignal,
    pub executing: bool,
    pub items_processed: u64,
    pub iteration_id: Option<String>,
    pub latest_checkpoint: Option<CheckpointMetadata>,
    pub metrics: CollectorSnapshot,
}

/// Registry entry for one job
///
/// The state machine and the frontier are mutated under the machine lock,
/// which serializes every transition and progress update of the job.
#[derive(Debug)]
pub struct CrawlJob {
    crawl_id: String,
    pub(crate) machine: Mutex<CrawlStateMachine>,
    pub(crate) frontier: parking_lot::Mutex<FrontierSnapshot>,
    pub(crate) metrics: Arc<MetricsCollector>,
    signal: watch::Sender<RunSignal>,
    iteration_id: Option<String>,
    items_processed: AtomicU64,
    executing: AtomicBool,
}

impl CrawlJob {
    pub(crate) fn new(
        machine: CrawlStateMachine,
        frontier: FrontierSnapshot,
        metrics: Arc<MetricsCollector>,
        iteration_id: Option<String>,
        signal: RunSignal,
        items_processed: u64,
    ) -> Self {
        let (signal, _) = watch::channel(signal);
        Self {
            crawl_id: machine.crawl_id().to_string(),
            machine: Mutex::new(machine),
            frontier: parking_lot::Mutex::new(frontier),
            metrics,
            signal,
            iteration_id,
            items_processed: AtomicU64::new(items_processed),
            executing: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    #[must_use]
    pub fn iteration_id(&self) -> Option<&str> {
        self.iteration_id.as_deref()
    }

    #[must_use]
    pub fn signal(&self) -> RunSignal {
        *self.signal.borrow()
    }

    pub(crate) fn set_signal(&self, signal: RunSignal) {
        self.signal.send_replace(signal);
    }

    #[must_use]
    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    /// Count one processed item, returning the new total
    pub(crate) fn add_item(&self) -> u64 {
        self.items_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Claim the executor slot; `None` if another executor holds it
    pub(crate) fn begin_execution(self: &Arc<Self>) -> Option<ExecutionGuard> {
        self.executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExecutionGuard {
                job: Arc::clone(self),
            })
    }

    /// Wait until the job is not paused
    ///
    /// # Errors
    /// Returns `OrchestratorError::Cancelled` if the job is cancelled first.
    pub(crate) async fn wait_while_paused(&self) -> Result<(), OrchestratorError> {
        let mut signal = self.signal.subscribe();
        let current = signal
            .wait_for(|signal| *signal != RunSignal::Paused)
            .await
            .map(|signal| *signal)
            .unwrap_or(RunSignal::Cancelled);
        match current {
            RunSignal::Cancelled => Err(OrchestratorError::Cancelled(self.crawl_id.clone())),
            _ => Ok(()),
        }
    }

    /// Resolves once the job is cancelled
    pub(crate) async fn cancelled(&self) {
        let mut signal = self.signal.subscribe();
        // The sender lives as long as the job, so an error cannot occur here
        let _ = signal.wait_for(|signal| *signal == RunSignal::Cancelled).await;
    }

    /// Consistent copy of state and frontier, taken under the machine lock
    pub(crate) fn snapshot(
        &self,
        machine: &CrawlStateMachine,
    ) -> (CrawlStateData, FrontierSnapshot) {
        (machine.data().clone(), self.frontier.lock().clone())
    }

    /// Write a checkpoint of the job while the caller holds the machine lock
    pub(crate) async fn checkpoint_locked(
        &self,
        context: &HarvestContext,
        machine: &CrawlStateMachine,
        checkpoint_type: CheckpointType,
        metadata: Option<Map<String, Value>>,
    ) -> Result<CheckpointMetadata, OrchestratorError> {
        let (state, frontier) = self.snapshot(machine);
        let checkpoint = context
            .checkpoints()
            .create_checkpoint(&state, &frontier, checkpoint_type, metadata)
            .await?;

        let event = CrawlEvent::checkpoint_created(
            &self.crawl_id,
            &checkpoint.checkpoint_id,
            checkpoint_type.as_str(),
        );
        if let Err(e) = context.event_bus().publish(event) {
            log::debug!("Checkpoint event for crawl {} not published: {e}", self.crawl_id);
        }

        let keep_last = context.config().checkpoint_keep_last();
        if let Err(e) = context
            .checkpoints()
            .delete_old_checkpoints(&self.crawl_id, keep_last)
            .await
        {
            log::warn!("Pruning checkpoints for crawl {} failed: {e}", self.crawl_id);
        }
        Ok(checkpoint)
    }
}

/// Releases the executor slot on drop
#[derive(Debug)]
pub(crate) struct ExecutionGuard {
    job: Arc<CrawlJob>,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.job.executing.store(false, Ordering::Release);
    }
}
