//! Iteration data model

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of pass over a target set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationMode {
    /// Reference pass; everything is fetched and fingerprinted
    Baseline,
    /// Fetch only what cache validators cannot rule out
    Incremental,
    /// Fetch everything and diff against the baseline
    Full,
}

impl IterationMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for IterationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    New,
    Modified,
    Unchanged,
    Removed,
}

/// Content hash plus cache validators for one url
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub url: String,
    /// SHA-256, hex
    pub content_hash: String,
    pub content_size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Iteration that holds this fingerprint
    pub iteration_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMetadata {
    pub iteration_id: String,
    pub crawl_id: String,
    pub iteration_number: u64,
    pub mode: IterationMode,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parent_iteration_id: Option<String>,
    /// Reference pass this iteration diffs against; `None` for baselines
    pub baseline_iteration_id: Option<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub stats: Map<String, Value>,
}

impl IterationMetadata {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Pre-fetch verdict from cache validators
///
/// A `Modified` verdict is provisional; the content hash recorded after the
/// fetch decides the final classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlDecision {
    pub should_fetch: bool,
    pub change_type: ChangeType,
}

impl CrawlDecision {
    pub(crate) fn fetch(change_type: ChangeType) -> Self {
        Self {
            should_fetch: true,
            change_type,
        }
    }

    pub(crate) fn skip() -> Self {
        Self {
            should_fetch: false,
            change_type: ChangeType::Unchanged,
        }
    }
}

/// Authoritative result of recording fetched content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub fingerprint: DocumentFingerprint,
    pub change_type: ChangeType,
}

/// Url-level diff of two iterations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationComparison {
    pub baseline_id: String,
    pub current_id: String,
    pub new: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl IterationComparison {
    /// Counts keyed as stored in iteration stats
    #[must_use]
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("new", self.new.len()),
            ("modified", self.modified.len()),
            ("unchanged", self.unchanged.len()),
            ("removed", self.removed.len()),
        ])
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !(self.new.is_empty() && self.modified.is_empty() && self.removed.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationStatistics {
    pub total_iterations: usize,
    pub completed_iterations: usize,
    pub crawls: usize,
    pub total_fingerprints: usize,
    pub by_mode: BTreeMap<IterationMode, usize>,
}
