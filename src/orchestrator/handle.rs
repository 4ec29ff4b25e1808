//! Reporting surface handed to pipeline stages
//!
//! Every report updates progress under the job lock, records metrics and
//! publishes the matching event. Items that finish a unit of work count
//! towards the AUTO checkpoint cadence.

use std::sync::Arc;

use chrono::Utc;

use super::context::HarvestContext;
use super::errors::OrchestratorError;
use super::job::CrawlJob;
use crate::checkpoint::{CheckpointType, DocumentRef};
use crate::crawl_events::{CrawlEvent, EventType};
use crate::crawl_state::{CrawlProgress, CrawlStateMachine, CrawlSubstate, ProgressCategory};
use crate::iteration::{ChangeType, CrawlDecision, RecordOutcome};

pub struct StageHandle {
    context: Arc<HarvestContext>,
    job: Arc<CrawlJob>,
    substate: CrawlSubstate,
}

impl StageHandle {
    pub(crate) fn new(context: Arc<HarvestContext>, job: Arc<CrawlJob>, substate: CrawlSubstate) -> Self {
        Self {
            context,
            job,
            substate,
        }
    }

    #[must_use]
    pub fn crawl_id(&self) -> &str {
        self.job.crawl_id()
    }

    #[must_use]
    pub fn substate(&self) -> CrawlSubstate {
        self.substate
    }

    #[must_use]
    pub fn iteration_id(&self) -> Option<&str> {
        self.job.iteration_id()
    }

    /// Job configuration supplied at creation
    #[must_use]
    pub fn config(&self) -> serde_json::Value {
        self.job.frontier.lock().config.clone()
    }

    /// Urls discovered but not yet crawled or failed, in sorted order
    #[must_use]
    pub fn queued_urls(&self) -> Vec<String> {
        self.job.frontier.lock().queued_urls.iter().cloned().collect()
    }

    /// Documents downloaded so far
    #[must_use]
    pub fn downloaded_documents(&self) -> Vec<DocumentRef> {
        self.job.frontier.lock().downloaded_documents.clone()
    }

    #[must_use]
    pub fn is_processed(&self, url: &str) -> bool {
        self.job.frontier.lock().processed_documents.contains(url)
    }

    fn publish(&self, event: CrawlEvent) {
        if let Err(e) = self.context.event_bus().publish(event) {
            log::debug!("Event for crawl {} not published: {e}", self.crawl_id());
        }
    }

    fn publish_progress(&self, category: ProgressCategory, progress: CrawlProgress) {
        self.publish(CrawlEvent::progress_update(
            self.crawl_id(),
            category.as_str(),
            progress.completed,
            progress.failed,
            progress.total,
            progress.percentage(),
        ));
    }

    /// Count a finished item and write an AUTO checkpoint on the cadence
    async fn finish_item(&self, machine: &CrawlStateMachine) -> Result<(), OrchestratorError> {
        let processed = self.job.add_item();
        let interval = self.context.config().auto_checkpoint_interval();
        if interval == 0 || processed % interval != 0 {
            return Ok(());
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("items_processed".into(), processed.into());
        metadata.insert("substate".into(), self.substate.as_str().into());
        self.job
            .checkpoint_locked(&self.context, machine, CheckpointType::Auto, Some(metadata))
            .await?;
        self.publish(CrawlEvent::milestone(self.crawl_id(), "items_processed", processed));
        Ok(())
    }

    /// Add urls to the frontier; returns how many were new
    pub async fn urls_discovered<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut machine = self.job.machine.lock().await;
        let added = {
            let mut frontier = self.job.frontier.lock();
            let mut added = 0;
            for url in urls {
                let url = url.into();
                if frontier.crawled_urls.contains(&url) || frontier.failed_urls.contains(&url) {
                    continue;
                }
                if frontier.queued_urls.insert(url) {
                    added += 1;
                }
            }
            added
        };
        if added > 0 {
            let progress = machine.add_to_total(ProgressCategory::Urls, added as u64);
            self.publish_progress(ProgressCategory::Urls, progress);
        }
        added
    }

    /// Mark a url crawled
    ///
    /// # Errors
    /// Fails only if the AUTO checkpoint this item triggers cannot be written.
    pub async fn url_crawled(&self, url: &str) -> Result<(), OrchestratorError> {
        let mut machine = self.job.machine.lock().await;
        let newly_crawled = {
            let mut frontier = self.job.frontier.lock();
            frontier.queued_urls.remove(url);
            frontier.crawled_urls.insert(url.to_string())
        };
        if !newly_crawled {
            return Ok(());
        }

        let progress = machine.increment_progress(ProgressCategory::Urls, 1, 0);
        let started = machine.data().started_at.unwrap_or_else(Utc::now);
        self.job
            .metrics
            .calculate_throughput(progress.completed, started, "pages_per_second");
        self.publish(CrawlEvent::page_crawled(self.crawl_id(), url));
        self.publish_progress(ProgressCategory::Urls, progress);
        self.finish_item(&machine).await
    }

    /// Mark a url failed
    ///
    /// # Errors
    /// Fails only if the AUTO checkpoint this item triggers cannot be written.
    pub async fn url_failed(&self, url: &str, reason: &str) -> Result<(), OrchestratorError> {
        let mut machine = self.job.machine.lock().await;
        let newly_failed = {
            let mut frontier = self.job.frontier.lock();
            frontier.queued_urls.remove(url);
            !frontier.crawled_urls.contains(url) && frontier.failed_urls.insert(url.to_string())
        };
        if !newly_failed {
            return Ok(());
        }

        let progress = machine.increment_progress(ProgressCategory::Urls, 0, 1);
        machine.record_error(format!("{url}: {reason}"));
        self.job
            .metrics
            .calculate_success_rate(progress.completed, progress.failed);
        self.publish(CrawlEvent::page_failed(self.crawl_id(), url, reason));
        self.publish_progress(ProgressCategory::Urls, progress);
        self.finish_item(&machine).await
    }

    /// A document link was found; grows the document total
    pub async fn document_found(&self, url: &str) {
        let mut machine = self.job.machine.lock().await;
        let progress = machine.add_to_total(ProgressCategory::Documents, 1);
        self.publish(CrawlEvent::document_found(self.crawl_id(), url));
        self.publish_progress(ProgressCategory::Documents, progress);
    }

    /// A document was stored locally
    pub async fn document_downloaded(&self, document: DocumentRef) {
        let mut machine = self.job.machine.lock().await;
        let progress = machine.increment_progress(ProgressCategory::Documents, 1, 0);
        machine.add_to_total(ProgressCategory::Extractions, 1);
        machine.add_to_total(ProgressCategory::Processing, 1);

        let started = machine.data().started_at.unwrap_or_else(Utc::now);
        self.job
            .metrics
            .calculate_throughput(progress.completed, started, "documents_per_second");
        self.publish(CrawlEvent::document_downloaded(
            self.crawl_id(),
            &document.url,
            document.size_bytes,
        ));
        self.publish_progress(ProgressCategory::Documents, progress);
        self.job.frontier.lock().downloaded_documents.push(document);
    }

    pub async fn document_failed(&self, url: &str, reason: &str) {
        let mut machine = self.job.machine.lock().await;
        let progress = machine.increment_progress(ProgressCategory::Documents, 0, 1);
        machine.record_error(format!("{url}: {reason}"));
        self.publish(CrawlEvent::warning(
            self.crawl_id(),
            &format!("Document {url} failed: {reason}"),
        ));
        self.publish_progress(ProgressCategory::Documents, progress);
    }

    /// Result of extracting one document
    pub async fn extraction_done(&self, url: &str, succeeded: bool, detail: Option<&str>) {
        let mut machine = self.job.machine.lock().await;
        let progress = if succeeded {
            machine.increment_progress(ProgressCategory::Extractions, 1, 0)
        } else {
            machine.increment_progress(ProgressCategory::Extractions, 0, 1)
        };
        let attempted = progress.completed.saturating_add(progress.failed);
        if attempted > 0 {
            self.job.metrics.record(
                "extraction_success_rate",
                progress.completed as f64 / attempted as f64 * 100.0,
                None,
            );
        }
        let event_type = if succeeded {
            EventType::ExtractionComplete
        } else {
            EventType::ExtractionFailed
        };
        self.publish(CrawlEvent::extraction(self.crawl_id(), event_type, url, detail));
        self.publish_progress(ProgressCategory::Extractions, progress);
    }

    /// A document finished processing, optionally with its quality score
    ///
    /// # Errors
    /// Fails only if the AUTO checkpoint this item triggers cannot be written.
    pub async fn document_processed(
        &self,
        url: &str,
        quality_score: Option<f64>,
    ) -> Result<(), OrchestratorError> {
        let mut machine = self.job.machine.lock().await;
        if !self.job.frontier.lock().processed_documents.insert(url.to_string()) {
            return Ok(());
        }
        let progress = machine.increment_progress(ProgressCategory::Processing, 1, 0);

        if let Some(score) = quality_score {
            let threshold = crate::utils::DEFAULT_QUALITY_THRESHOLD;
            self.job.metrics.calculate_quality_metrics(&[score], Some(threshold));
            self.publish(CrawlEvent::quality_assessed(
                self.crawl_id(),
                url,
                score,
                score >= threshold,
            ));
        }
        self.publish(CrawlEvent::document_processed(self.crawl_id(), url));
        self.publish_progress(ProgressCategory::Processing, progress);
        self.finish_item(&machine).await
    }

    /// Suspend while the job is paused
    ///
    /// # Errors
    /// Returns `OrchestratorError::Cancelled` once the job is cancelled; the
    /// stage should return promptly.
    pub async fn pause_point(&self) -> Result<(), OrchestratorError> {
        self.job.wait_while_paused().await
    }

    /// Whether `url` must be fetched in the attached iteration
    ///
    /// Without an iteration every url is fetched as new.
    ///
    /// # Errors
    /// Propagates iteration lookup failures.
    pub fn should_fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<CrawlDecision, OrchestratorError> {
        let Some(iteration_id) = self.iteration_id() else {
            return Ok(CrawlDecision::fetch(ChangeType::New));
        };
        Ok(self
            .context
            .iterations()
            .should_crawl_url(iteration_id, url, etag, last_modified)?)
    }

    /// Fingerprint fetched content in the attached iteration
    ///
    /// Returns `None` when the job has no iteration.
    ///
    /// # Errors
    /// Propagates iteration failures.
    pub fn record_document(
        &self,
        url: &str,
        content: &[u8],
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<Option<RecordOutcome>, OrchestratorError> {
        let Some(iteration_id) = self.iteration_id() else {
            return Ok(None);
        };
        let outcome = self.context.iterations().record_document(
            iteration_id,
            url,
            content,
            etag,
            last_modified,
        )?;
        Ok(Some(outcome))
    }

    /// Publish an arbitrary event for this job
    pub fn publish_event(&self, event: CrawlEvent) {
        self.publish(event);
    }
}
