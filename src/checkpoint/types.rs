//! Checkpoint data model

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crawl_state::{CrawlState, CrawlStateData, CrawlSubstate};

/// What triggered a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    /// Every K processed items
    Auto,
    Manual,
    Pause,
    Error,
}

impl CheckpointType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Pause => "pause",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a document fetched by the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub url: String,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Caller-owned work frontier captured alongside the lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    pub crawled_urls: BTreeSet<String>,
    pub queued_urls: BTreeSet<String>,
    pub failed_urls: BTreeSet<String>,
    pub downloaded_documents: Vec<DocumentRef>,
    pub processed_documents: BTreeSet<String>,
    /// Job configuration as supplied by the caller
    #[serde(default)]
    pub config: Value,
}

/// Adjacent plaintext metadata file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub checkpoint_id: String,
    pub crawl_id: String,
    pub created_at: DateTime<Utc>,
    pub checkpoint_type: CheckpointType,
    pub can_resume: bool,

    pub checkpoint_number: u64,
    pub current_state: CrawlState,
    pub current_substate: Option<CrawlSubstate>,
    pub overall_progress: f64,
    pub urls_crawled: usize,
    pub urls_queued: usize,
    pub compressed_size_bytes: u64,
    /// xxh3-64 of the uncompressed payload, hex
    pub payload_checksum: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Compressed snapshot payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub checkpoint_id: String,
    pub crawl_id: String,
    pub created_at: DateTime<Utc>,
    pub checkpoint_type: CheckpointType,
    pub state: CrawlStateData,
    pub frontier: FrontierSnapshot,
}

impl CheckpointData {
    /// Most recent error recorded before the snapshot
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.state.error_message.as_deref()
    }
}

/// Totals over every checkpoint known to a manager
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckpointStatistics {
    pub total_checkpoints: usize,
    pub crawls_with_checkpoints: usize,
    pub total_size_bytes: u64,
    pub by_type: BTreeMap<CheckpointType, usize>,
}
