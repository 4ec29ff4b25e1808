//! Job registry and lifecycle driver

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::context::HarvestContext;
use super::errors::OrchestratorError;
use super::handle::StageHandle;
use super::job::{CrawlJob, JobSpec, JobStatus, RunSignal};
use super::pipeline::HarvestPipeline;
use crate::checkpoint::manager::is_safe_crawl_id;
use crate::checkpoint::{CheckpointError, CheckpointMetadata, CheckpointType, FrontierSnapshot};
use crate::crawl_events::CrawlEvent;
use crate::crawl_metrics::AggregatedMetrics;
use crate::crawl_state::{
    CrawlState, CrawlStateMachine, CrawlSubstate, ProgressCategory, StateSummary,
};

/// Initial capacity for the job registry
const JOB_REGISTRY_INITIAL_CAPACITY: usize = 16;

/// Working states in execution order
static WORKING_STATES: [CrawlState; 3] = [
    CrawlState::Crawling,
    CrawlState::Extracting,
    CrawlState::Processing,
];

fn stage_plan() -> impl Iterator<Item = CrawlSubstate> {
    WORKING_STATES
        .iter()
        .flat_map(|state| state.substates().iter().copied())
}

enum StageEntry {
    Entered,
    Paused,
    Finished(CrawlState),
}

fn reason_metadata(key: &str, value: impl Into<Value>) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert(key.to_string(), value.into());
    metadata
}

/// Composition root driving many jobs concurrently
///
/// Cloning is cheap; clones share the registry and context.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    context: Arc<HarvestContext>,
    jobs: Arc<Mutex<HashMap<String, Arc<CrawlJob>>>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(context: Arc<HarvestContext>) -> Self {
        Self {
            context,
            jobs: Arc::new(Mutex::new(HashMap::with_capacity(
                JOB_REGISTRY_INITIAL_CAPACITY,
            ))),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<HarvestContext> {
        &self.context
    }

    async fn job(&self, crawl_id: &str) -> Result<Arc<CrawlJob>, OrchestratorError> {
        self.jobs
            .lock()
            .await
            .get(crawl_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::JobNotFound(crawl_id.to_string()))
    }

    fn publish(&self, event: CrawlEvent) {
        if let Err(e) = self.context.event_bus().publish(event) {
            tracing::debug!(error = %e, "Lifecycle event not published");
        }
    }

    /// Register a job in QUEUED
    ///
    /// Seed urls enter the frontier queue. With an iteration mode, an
    /// iteration is started for the job.
    ///
    /// # Errors
    /// * `JobExists` - the id is already registered
    /// * `Checkpoint(InvalidCrawlId)` - the id cannot be used in storage paths
    /// * `Iteration(NoBaseline)` - incremental mode without a baseline
    pub async fn create_crawl(&self, spec: JobSpec) -> Result<String, OrchestratorError> {
        let crawl_id = spec
            .crawl_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if !is_safe_crawl_id(&crawl_id) {
            return Err(CheckpointError::InvalidCrawlId(crawl_id).into());
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&crawl_id) {
            return Err(OrchestratorError::JobExists(crawl_id));
        }

        let iteration_id = match spec.iteration_mode {
            Some(mode) => {
                let iteration = self.context.iterations().create_iteration(
                    &crawl_id,
                    spec.config.clone(),
                    mode,
                )?;
                self.publish(CrawlEvent::iteration_started(
                    &crawl_id,
                    &iteration.iteration_id,
                    mode.as_str(),
                ));
                Some(iteration.iteration_id)
            }
            None => None,
        };

        let mut machine =
            CrawlStateMachine::new(crawl_id.clone(), Arc::clone(self.context.event_bus()));
        let frontier = FrontierSnapshot {
            queued_urls: spec.seed_urls.into_iter().collect(),
            config: spec.config,
            ..FrontierSnapshot::default()
        };
        machine.add_to_total(ProgressCategory::Urls, frontier.queued_urls.len() as u64);

        let metrics = self.context.metrics().get_or_create_collector(&crawl_id);
        let job = CrawlJob::new(machine, frontier, metrics, iteration_id, RunSignal::Running, 0);
        jobs.insert(crawl_id.clone(), Arc::new(job));

        tracing::info!(crawl_id = %crawl_id, "Crawl created");
        Ok(crawl_id)
    }

    /// Drive a job through every stage to a terminal state
    ///
    /// Starts from QUEUED, or continues a resumed job from its current
    /// substate. Between stages the executor waits while the job is paused;
    /// cancellation abandons the running stage at once. A stage error or a
    /// stage exceeding the soft timeout writes an ERROR checkpoint and fails
    /// the job with the reason.
    ///
    /// Returns the terminal state reached.
    ///
    /// # Errors
    /// * `JobNotFound` / `AlreadyExecuting`
    /// * `InvalidState` - the job is paused or already terminal
    #[tracing::instrument(skip_all, fields(crawl_id = %crawl_id))]
    pub async fn execute_crawl(
        &self,
        crawl_id: &str,
        pipeline: Arc<dyn HarvestPipeline>,
    ) -> Result<CrawlState, OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let _guard = job
            .begin_execution()
            .ok_or_else(|| OrchestratorError::AlreadyExecuting(crawl_id.to_string()))?;

        let resume_from = {
            let mut machine = job.machine.lock().await;
            match machine.current_state() {
                CrawlState::Queued => {
                    machine.transition(CrawlState::Initializing, None)?;
                    machine.transition(CrawlState::Crawling, None)?;
                    None
                }
                CrawlState::Initializing => {
                    machine.transition(CrawlState::Crawling, None)?;
                    None
                }
                state if state.is_pausable() => machine
                    .current_substate()
                    .or_else(|| state.substates().first().copied()),
                state => {
                    return Err(OrchestratorError::InvalidState {
                        crawl_id: crawl_id.to_string(),
                        state,
                        operation: "execute",
                    });
                }
            }
        };
        tracing::info!(resume_from = ?resume_from, "Crawl executing");

        let stages: Vec<CrawlSubstate> = match resume_from {
            Some(start) => stage_plan().skip_while(|stage| *stage != start).collect(),
            None => stage_plan().collect(),
        };

        for substate in stages {
            loop {
                if job.wait_while_paused().await.is_err() {
                    return Ok(CrawlState::Cancelled);
                }
                match self.enter_stage(&job, substate).await? {
                    StageEntry::Entered => break,
                    StageEntry::Paused => continue,
                    StageEntry::Finished(state) => return Ok(state),
                }
            }

            let handle = StageHandle::new(Arc::clone(&self.context), Arc::clone(&job), substate);
            let soft_timeout = self.context.config().substate_timeout();
            let outcome = tokio::select! {
                biased;
                () = job.cancelled() => {
                    tracing::info!(substate = %substate, "Stage abandoned on cancel");
                    return Ok(CrawlState::Cancelled);
                }
                result = tokio::time::timeout(soft_timeout, pipeline.run_stage(&handle, substate)) => result,
            };

            match outcome {
                Ok(Ok(())) => {
                    job.metrics.record_system_metrics();
                }
                Ok(Err(e)) => {
                    // Cancellation surfaced through a pause point
                    if job.signal() == RunSignal::Cancelled {
                        return Ok(CrawlState::Cancelled);
                    }
                    let reason = format!("Stage {substate} failed: {e:#}");
                    return self.fail_job(&job, reason).await;
                }
                Err(_) => {
                    let reason = OrchestratorError::Timeout {
                        substate,
                        after: soft_timeout,
                    }
                    .to_string();
                    return self.fail_job(&job, reason).await;
                }
            }
        }

        // A pause issued during the last stage holds completion until resume
        loop {
            if job.wait_while_paused().await.is_err() {
                return Ok(CrawlState::Cancelled);
            }
            if let Some(state) = self.complete_job(&job).await? {
                return Ok(state);
            }
        }
    }

    /// Move the machine into the stage's state and substate
    async fn enter_stage(
        &self,
        job: &CrawlJob,
        substate: CrawlSubstate,
    ) -> Result<StageEntry, OrchestratorError> {
        let mut machine = job.machine.lock().await;
        match machine.current_state() {
            state if state.is_terminal() => return Ok(StageEntry::Finished(state)),
            // Paused after the signal was checked; wait again
            CrawlState::Paused => return Ok(StageEntry::Paused),
            _ => {}
        }
        let state = substate.parent_state();
        if machine.current_state() != state {
            machine.transition(state, None)?;
        }
        if machine.current_substate() != Some(substate) {
            machine.transition_substate(substate)?;
        }
        Ok(StageEntry::Entered)
    }

    async fn fail_job(&self, job: &CrawlJob, reason: String) -> Result<CrawlState, OrchestratorError> {
        let mut machine = job.machine.lock().await;
        if machine.is_terminal() {
            return Ok(machine.current_state());
        }
        tracing::error!(crawl_id = %job.crawl_id(), reason = %reason, "Crawl failing");

        // FAILED is only reachable from a working state
        if machine.current_state() == CrawlState::Paused
            && let Some(origin) = machine.pre_pause_state()
        {
            machine.transition(origin, Some(reason_metadata("reason", "failing while paused")))?;
        }
        machine.record_error(reason.clone());
        self.publish(CrawlEvent::error(job.crawl_id(), &reason, None));

        let metadata = reason_metadata("reason", reason.clone());
        if let Err(e) = job
            .checkpoint_locked(&self.context, &machine, CheckpointType::Error, Some(metadata))
            .await
        {
            tracing::warn!(crawl_id = %job.crawl_id(), error = %e, "Error checkpoint not written");
        }

        machine.transition(CrawlState::Failed, Some(reason_metadata("reason", reason)))?;
        Ok(CrawlState::Failed)
    }

    /// `None` when the job was paused after the last pause check
    async fn complete_job(&self, job: &CrawlJob) -> Result<Option<CrawlState>, OrchestratorError> {
        let mut machine = job.machine.lock().await;
        match machine.current_state() {
            state if state.is_terminal() => return Ok(Some(state)),
            CrawlState::Paused => return Ok(None),
            _ => {}
        }
        machine.transition(CrawlState::Completed, None)?;

        let urls = machine.data().progress(ProgressCategory::Urls);
        job.metrics.calculate_success_rate(urls.completed, urls.failed);
        job.metrics.record_system_metrics();

        if let Some(iteration_id) = job.iteration_id() {
            let mut stats = Map::new();
            stats.insert("items_processed".into(), job.items_processed().into());
            stats.insert("urls_crawled".into(), urls.completed.into());
            stats.insert("urls_failed".into(), urls.failed.into());
            match self
                .context
                .iterations()
                .complete_iteration(iteration_id, stats)
            {
                Ok(iteration) => self.publish(CrawlEvent::iteration_completed(
                    job.crawl_id(),
                    iteration_id,
                    Value::Object(iteration.stats),
                )),
                Err(e) => {
                    tracing::warn!(crawl_id = %job.crawl_id(), error = %e, "Iteration not completed");
                }
            }
        }

        let elapsed = machine.data().elapsed_seconds();
        self.publish(CrawlEvent::crawl_completed(
            job.crawl_id(),
            elapsed,
            job.items_processed(),
        ));
        tracing::info!(crawl_id = %job.crawl_id(), elapsed, "Crawl completed");
        Ok(Some(CrawlState::Completed))
    }

    /// Run `execute_crawl` on a background task
    pub fn spawn_crawl(
        &self,
        crawl_id: &str,
        pipeline: Arc<dyn HarvestPipeline>,
    ) -> JoinHandle<Result<CrawlState, OrchestratorError>> {
        let orchestrator = self.clone();
        let crawl_id = crawl_id.to_string();
        tokio::spawn(async move { orchestrator.execute_crawl(&crawl_id, pipeline).await })
    }

    /// Checkpoint and pause a working job
    ///
    /// A PAUSE checkpoint is written first; if it cannot be written the
    /// failure is logged and the pause still happens. Returns the checkpoint
    /// id when one was written.
    ///
    /// # Errors
    /// * `JobNotFound`
    /// * `InvalidState` - the job is not in a pausable state
    pub async fn pause_crawl(&self, crawl_id: &str) -> Result<Option<String>, OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let mut machine = job.machine.lock().await;
        if !machine.can_pause() {
            return Err(OrchestratorError::InvalidState {
                crawl_id: crawl_id.to_string(),
                state: machine.current_state(),
                operation: "pause",
            });
        }

        let checkpoint_id = match job
            .checkpoint_locked(&self.context, &machine, CheckpointType::Pause, None)
            .await
        {
            Ok(checkpoint) => Some(checkpoint.checkpoint_id),
            Err(e) => {
                tracing::warn!(crawl_id = %crawl_id, error = %e, "Pause checkpoint not written");
                None
            }
        };

        let metadata = checkpoint_id
            .as_ref()
            .map(|id| reason_metadata("checkpoint_id", id.clone()));
        machine.transition(CrawlState::Paused, metadata)?;
        job.set_signal(RunSignal::Paused);
        self.publish(CrawlEvent::crawl_paused(crawl_id, checkpoint_id.as_deref()));

        tracing::info!(crawl_id = %crawl_id, "Crawl paused");
        Ok(checkpoint_id)
    }

    /// Return a paused job to the state it was paused from
    ///
    /// # Errors
    /// * `JobNotFound`
    /// * `InvalidState` - the job is not paused
    pub async fn resume_crawl(&self, crawl_id: &str) -> Result<CrawlState, OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let mut machine = job.machine.lock().await;
        let origin = match machine.pre_pause_state() {
            Some(origin) if machine.can_resume() => origin,
            _ => {
                return Err(OrchestratorError::InvalidState {
                    crawl_id: crawl_id.to_string(),
                    state: machine.current_state(),
                    operation: "resume",
                });
            }
        };

        machine.transition(origin, None)?;
        job.set_signal(RunSignal::Running);
        self.publish(CrawlEvent::crawl_resumed(crawl_id, origin.as_str()));

        tracing::info!(crawl_id = %crawl_id, state = %origin, "Crawl resumed");
        Ok(origin)
    }

    /// Cancel a job from any non-terminal state
    ///
    /// A running stage is abandoned without being awaited.
    ///
    /// # Errors
    /// * `JobNotFound`
    /// * `InvalidState` - the job is already terminal
    pub async fn cancel_crawl(&self, crawl_id: &str) -> Result<(), OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let mut machine = job.machine.lock().await;
        let from = machine.current_state();
        if from.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                crawl_id: crawl_id.to_string(),
                state: from,
                operation: "cancel",
            });
        }

        machine.transition(CrawlState::Cancelled, None)?;
        job.set_signal(RunSignal::Cancelled);
        self.publish(CrawlEvent::crawl_cancelled(crawl_id, from.as_str()));

        tracing::info!(crawl_id = %crawl_id, from = %from, "Crawl cancelled");
        Ok(())
    }

    /// Write a MANUAL checkpoint of the job's current state
    ///
    /// # Errors
    /// * `JobNotFound`
    /// * `Checkpoint` - the write failed
    pub async fn create_manual_checkpoint(
        &self,
        crawl_id: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<CheckpointMetadata, OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let machine = job.machine.lock().await;
        job.checkpoint_locked(&self.context, &machine, CheckpointType::Manual, metadata)
            .await
    }

    /// Rebuild a job from its latest checkpoint
    ///
    /// Returns `None` when there is nothing to restore, so the caller can
    /// start fresh. A job snapshotted in a working state is restored as
    /// PAUSED; call [`Self::resume_crawl`] and then execute it to continue
    /// from the recorded substate.
    ///
    /// # Errors
    /// * `AlreadyExecuting` - the registered job is running
    /// * `Checkpoint(Corrupt | NotResumable)` - the checkpoint cannot be trusted
    pub async fn restore_from_checkpoint(
        &self,
        crawl_id: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        let Some(latest) = self.context.checkpoints().get_latest_checkpoint(crawl_id) else {
            tracing::info!(crawl_id = %crawl_id, "No checkpoint to restore");
            return Ok(None);
        };

        let data = match self
            .context
            .checkpoints()
            .resume_from_checkpoint(&latest.checkpoint_id, true)
            .await
        {
            Ok(data) => data,
            Err(CheckpointError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut jobs = self.jobs.lock().await;
        if jobs.get(crawl_id).is_some_and(|job| job.is_executing()) {
            return Err(OrchestratorError::AlreadyExecuting(crawl_id.to_string()));
        }

        let mut machine =
            CrawlStateMachine::restore(data.state, Arc::clone(self.context.event_bus()));
        if machine.can_pause() {
            machine.transition(
                CrawlState::Paused,
                Some(reason_metadata("restored_from", data.checkpoint_id.clone())),
            )?;
        }
        let signal = if machine.can_resume() {
            RunSignal::Paused
        } else {
            RunSignal::Running
        };

        let frontier = data.frontier;
        let items_processed = (frontier.crawled_urls.len()
            + frontier.failed_urls.len()
            + frontier.processed_documents.len()) as u64;
        let iteration_id = self
            .context
            .iterations()
            .get_latest_iteration(crawl_id)
            .filter(|iteration| !iteration.is_completed())
            .map(|iteration| iteration.iteration_id);
        let metrics = self.context.metrics().get_or_create_collector(crawl_id);

        let job = CrawlJob::new(machine, frontier, metrics, iteration_id, signal, items_processed);
        jobs.insert(crawl_id.to_string(), Arc::new(job));

        tracing::info!(
            crawl_id = %crawl_id,
            checkpoint_id = %data.checkpoint_id,
            "Crawl restored from checkpoint"
        );
        Ok(Some(data.checkpoint_id))
    }

    /// Forget a job and delete its checkpoints, iterations, metrics and
    /// event history; a live job is cancelled first
    ///
    /// Returns whether the job was registered.
    ///
    /// # Errors
    /// Propagates storage failures while deleting files.
    pub async fn delete_crawl(&self, crawl_id: &str) -> Result<bool, OrchestratorError> {
        let existed = match self.job(crawl_id).await {
            Ok(job) => {
                let live = !job.machine.lock().await.is_terminal();
                if live {
                    match self.cancel_crawl(crawl_id).await {
                        // Finished on its own in the meantime
                        Ok(()) | Err(OrchestratorError::InvalidState { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                true
            }
            Err(_) => false,
        };

        self.jobs.lock().await.remove(crawl_id);
        self.context.metrics().remove_collector(crawl_id);
        self.context.event_bus().cleanup_crawl(crawl_id);
        let checkpoints = self.context.checkpoints().remove_crawl(crawl_id).await?;
        let iterations = self.context.iterations().remove_crawl(crawl_id)?;

        tracing::info!(crawl_id = %crawl_id, checkpoints, iterations, "Crawl deleted");
        Ok(existed)
    }

    /// # Errors
    /// Returns `JobNotFound` for unknown ids.
    pub async fn get_status(&self, crawl_id: &str) -> Result<JobStatus, OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let state = job.machine.lock().await.get_state_summary();
        Ok(JobStatus {
            state,
            signal: job.signal(),
            executing: job.is_executing(),
            items_processed: job.items_processed(),
            iteration_id: job.iteration_id().map(str::to_string),
            latest_checkpoint: self.context.checkpoints().get_latest_checkpoint(crawl_id),
            metrics: job.metrics.get_snapshot(),
        })
    }

    /// # Errors
    /// Returns `JobNotFound` for unknown ids.
    pub async fn get_state(&self, crawl_id: &str) -> Result<StateSummary, OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let summary = job.machine.lock().await.get_state_summary();
        Ok(summary)
    }

    /// Windowed metrics; the configured default window when `None`
    ///
    /// # Errors
    /// Returns `JobNotFound` for unknown ids.
    pub async fn get_metrics(
        &self,
        crawl_id: &str,
        window_seconds: Option<u64>,
    ) -> Result<AggregatedMetrics, OrchestratorError> {
        let job = self.job(crawl_id).await?;
        let window =
            window_seconds.unwrap_or_else(|| self.context.config().default_metrics_window_secs());
        Ok(job.metrics.get_aggregated_metrics(window))
    }

    /// Jobs ordered by creation time, optionally filtered by state
    pub async fn list_jobs(
        &self,
        state: Option<CrawlState>,
        limit: usize,
        offset: usize,
    ) -> Vec<StateSummary> {
        let jobs: Vec<Arc<CrawlJob>> = self.jobs.lock().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(jobs.len());
        for job in jobs {
            let summary = job.machine.lock().await.get_state_summary();
            if state.is_none_or(|wanted| summary.current_state == wanted) {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.crawl_id.cmp(&b.crawl_id))
        });
        summaries.into_iter().skip(offset).take(limit).collect()
    }

    /// Cancel every live job and close the context
    ///
    /// # Errors
    /// Returns the event bus drain error if subscribers do not finish within
    /// `drain_timeout`.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<(), OrchestratorError> {
        let ids: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        for crawl_id in ids {
            match self.cancel_crawl(&crawl_id).await {
                Ok(()) | Err(OrchestratorError::InvalidState { .. }) => {}
                Err(e) => tracing::warn!(crawl_id = %crawl_id, error = %e, "Cancel on shutdown failed"),
            }
        }
        self.context.shutdown(drain_timeout).await
    }
}
