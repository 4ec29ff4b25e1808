//! Per-job lifecycle state machine
//!
//! Validates every transition against the static edge table, appends the
//! accepted transition to the job's history and publishes exactly one event
//! for it. Rejected transitions leave the state untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::errors::StateError;
use super::types::{
    CrawlProgress, CrawlState, CrawlStateData, CrawlSubstate, ProgressCategory, StateSummary,
    StateTransition,
};
use crate::crawl_events::{CrawlEvent, CrawlEventBus};

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_microseconds().unwrap_or(i64::MAX).max(0) as f64 / 1_000_000.0
}

#[derive(Debug)]
pub struct CrawlStateMachine {
    data: CrawlStateData,
    event_bus: Arc<CrawlEventBus>,
}

impl CrawlStateMachine {
    /// New job in `Queued`
    #[must_use]
    pub fn new(crawl_id: impl Into<String>, event_bus: Arc<CrawlEventBus>) -> Self {
        Self {
            data: CrawlStateData::new(crawl_id),
            event_bus,
        }
    }

    /// Rebuild a machine from a snapshot without replaying its transitions
    #[must_use]
    pub fn restore(data: CrawlStateData, event_bus: Arc<CrawlEventBus>) -> Self {
        Self { data, event_bus }
    }

    #[must_use]
    pub fn crawl_id(&self) -> &str {
        &self.data.crawl_id
    }

    #[must_use]
    pub fn current_state(&self) -> CrawlState {
        self.data.current_state
    }

    #[must_use]
    pub fn current_substate(&self) -> Option<CrawlSubstate> {
        self.data.current_substate
    }

    #[must_use]
    pub fn pre_pause_state(&self) -> Option<CrawlState> {
        self.data.pre_pause_state
    }

    #[must_use]
    pub fn data(&self) -> &CrawlStateData {
        &self.data
    }

    #[must_use]
    pub fn history(&self) -> &[StateTransition] {
        &self.data.state_history
    }

    #[must_use]
    pub fn can_pause(&self) -> bool {
        self.data.current_state.is_pausable()
    }

    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.data.current_state == CrawlState::Paused
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.data.current_state.is_terminal()
    }

    /// Whether `to` is reachable from the current state in one step
    #[must_use]
    pub fn is_valid_transition(&self, to: CrawlState) -> bool {
        let from = self.data.current_state;
        if from == CrawlState::Paused && self.data.pre_pause_state == Some(to) {
            return true;
        }
        from.successors().contains(&to)
    }

    /// Move to `to`, recording and publishing the transition
    ///
    /// Entering `Paused` remembers the origin state and substate; leaving it
    /// for that origin restores both, and cancelling from it discards them.
    /// Any other transition clears the current substate.
    ///
    /// # Errors
    ///
    /// Returns `StateError::InvalidTransition` if the edge does not exist.
    /// The state is unchanged in that case.
    pub fn transition(
        &mut self,
        to: CrawlState,
        metadata: Option<Map<String, Value>>,
    ) -> Result<&StateTransition, StateError> {
        let from = self.data.current_state;
        if !self.is_valid_transition(to) {
            log::warn!(
                "Rejected transition {from} -> {to} for crawl {}",
                self.data.crawl_id
            );
            return Err(StateError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        let duration_seconds = seconds_between(self.data.last_transition_at, now);
        let mut metadata = metadata.unwrap_or_default();

        if let Some(substate) = self.data.current_substate {
            let substate_seconds = self
                .data
                .substate_entered_at
                .map_or(0.0, |entered| seconds_between(entered, now));
            metadata.insert("prior_substate".into(), Value::from(substate.as_str()));
            metadata.insert(
                "prior_substate_duration_seconds".into(),
                Value::from(substate_seconds),
            );
        }

        let mut next_substate = None;
        match (from, to) {
            (_, CrawlState::Paused) => {
                self.data.pre_pause_state = Some(from);
                self.data.pre_pause_substate = self.data.current_substate;
                self.data.paused_at = Some(now);
            }
            (CrawlState::Paused, CrawlState::Cancelled) => {
                self.data.pre_pause_state = None;
                self.data.pre_pause_substate = None;
            }
            (CrawlState::Paused, _) => {
                self.data.pre_pause_state = None;
                next_substate = self.data.pre_pause_substate.take();
            }
            _ => {}
        }

        if to == CrawlState::Initializing && self.data.started_at.is_none() {
            self.data.started_at = Some(now);
        }
        if to.is_terminal() {
            self.data.completed_at = Some(now);
        }

        self.data.current_state = to;
        self.data.current_substate = next_substate;
        self.data.substate_entered_at = next_substate.map(|_| now);
        self.data.last_transition_at = now;

        let event = CrawlEvent::state_change(
            &self.data.crawl_id,
            from.as_str(),
            to.as_str(),
            duration_seconds,
            metadata.clone(),
        );
        self.data.state_history.push(StateTransition {
            from_state: from,
            to_state: to,
            timestamp: now,
            duration_seconds,
            metadata,
        });

        log::info!(
            "Crawl {} transitioned {from} -> {to} after {duration_seconds:.2}s",
            self.data.crawl_id
        );
        if let Err(e) = self.event_bus.publish(event) {
            log::warn!(
                "State change for crawl {} not published: {e}",
                self.data.crawl_id
            );
        }

        // Just pushed above
        Ok(&self.data.state_history[self.data.state_history.len() - 1])
    }

    /// Enter a substate of the current main state
    ///
    /// Publishes one substate change event carrying the time spent in the
    /// previous substate.
    ///
    /// # Errors
    ///
    /// Returns `StateError::InvalidSubstate` if `to` belongs to another main
    /// state.
    pub fn transition_substate(&mut self, to: CrawlSubstate) -> Result<(), StateError> {
        let state = self.data.current_state;
        if to.parent_state() != state {
            log::warn!(
                "Rejected substate {to} while crawl {} is {state}",
                self.data.crawl_id
            );
            return Err(StateError::InvalidSubstate { state, substate: to });
        }

        let now = Utc::now();
        let from = self.data.current_substate;
        let prior_duration = from.and(
            self.data
                .substate_entered_at
                .map(|entered| seconds_between(entered, now)),
        );

        self.data.current_substate = Some(to);
        self.data.substate_entered_at = Some(now);

        log::debug!(
            "Crawl {} substate {} -> {to}",
            self.data.crawl_id,
            from.map_or("none", CrawlSubstate::as_str)
        );
        let event = CrawlEvent::substate_change(
            &self.data.crawl_id,
            state.as_str(),
            from.map(CrawlSubstate::as_str),
            to.as_str(),
            prior_duration,
        );
        if let Err(e) = self.event_bus.publish(event) {
            log::warn!(
                "Substate change for crawl {} not published: {e}",
                self.data.crawl_id
            );
        }
        Ok(())
    }

    /// Overwrite selected counters of one category
    pub fn update_progress(
        &mut self,
        category: ProgressCategory,
        completed: Option<u64>,
        failed: Option<u64>,
        total: Option<u64>,
    ) -> CrawlProgress {
        let progress = self.data.progress.entry(category).or_default();
        if let Some(total) = total {
            progress.total = total;
        }
        if let Some(completed) = completed {
            progress.completed = completed;
        }
        if let Some(failed) = failed {
            progress.failed = failed;
        }
        // Counts reported ahead of discovery grow the total
        progress.total = progress.total.max(progress.completed.saturating_add(progress.failed));
        *progress
    }

    /// Add to the completed/failed counters of one category
    pub fn increment_progress(
        &mut self,
        category: ProgressCategory,
        completed: u64,
        failed: u64,
    ) -> CrawlProgress {
        let current = self.data.progress(category);
        self.update_progress(
            category,
            Some(current.completed.saturating_add(completed)),
            Some(current.failed.saturating_add(failed)),
            None,
        )
    }

    /// Grow the total of one category
    pub fn add_to_total(&mut self, category: ProgressCategory, additional: u64) -> CrawlProgress {
        let current = self.data.progress(category);
        self.update_progress(category, None, None, Some(current.total + additional))
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.data.error_count += 1;
        self.data.error_message = Some(message.into());
    }

    #[must_use]
    pub fn overall_progress(&self) -> f64 {
        self.data.overall_progress()
    }

    #[must_use]
    pub fn get_state_summary(&self) -> StateSummary {
        let data = &self.data;
        StateSummary {
            crawl_id: data.crawl_id.clone(),
            current_state: data.current_state,
            current_substate: data.current_substate,
            pre_pause_state: data.pre_pause_state,
            is_terminal: self.is_terminal(),
            can_pause: self.can_pause(),
            can_resume: self.can_resume(),
            created_at: data.created_at,
            started_at: data.started_at,
            completed_at: data.completed_at,
            paused_at: data.paused_at,
            elapsed_seconds: data.elapsed_seconds(),
            progress: data
                .progress
                .iter()
                .map(|(category, progress)| (*category, (*progress).into()))
                .collect::<BTreeMap<_, _>>(),
            overall_progress: data.overall_progress(),
            error_message: data.error_message.clone(),
            error_count: data.error_count,
            transition_count: data.state_history.len(),
        }
    }
}
