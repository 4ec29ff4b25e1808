//! Lifecycle state types
//!
//! `CrawlState` is the main lifecycle graph, `CrawlSubstate` the finer phase
//! nested under the three working states.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Main lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    Queued,
    Initializing,
    Crawling,
    Extracting,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlState {
    pub const ALL: [CrawlState; 9] = [
        CrawlState::Queued,
        CrawlState::Initializing,
        CrawlState::Crawling,
        CrawlState::Extracting,
        CrawlState::Processing,
        CrawlState::Paused,
        CrawlState::Completed,
        CrawlState::Failed,
        CrawlState::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initializing => "initializing",
            Self::Crawling => "crawling",
            Self::Extracting => "extracting",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States a running job can be paused from
    #[must_use]
    pub fn is_pausable(self) -> bool {
        matches!(self, Self::Crawling | Self::Extracting | Self::Processing)
    }

    /// Static outgoing edges
    ///
    /// `Paused` lists only `Cancelled`; its resume edge targets the
    /// remembered pre-pause state and is resolved by the state machine.
    #[must_use]
    pub fn successors(self) -> &'static [CrawlState] {
        use CrawlState::*;
        match self {
            Queued => &[Initializing, Cancelled],
            Initializing => &[Crawling, Failed, Cancelled],
            Crawling => &[Extracting, Paused, Failed, Cancelled],
            Extracting => &[Processing, Paused, Failed, Cancelled],
            Processing => &[Completed, Paused, Failed, Cancelled],
            Paused => &[Cancelled],
            Completed | Failed | Cancelled => &[],
        }
    }

    /// Substates that may be active under this state
    #[must_use]
    pub fn substates(self) -> &'static [CrawlSubstate] {
        use CrawlSubstate::*;
        match self {
            Self::Crawling => &[DiscoveringUrls, DownloadingPages, DownloadingDocuments],
            Self::Extracting => &[PdfExtraction, Ocr, TableDetection],
            Self::Processing => &[MetadataExtraction, QualityScoring, Deduplication, Curation],
            _ => &[],
        }
    }
}

impl std::fmt::Display for CrawlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained phase nested under a working state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlSubstate {
    DiscoveringUrls,
    DownloadingPages,
    DownloadingDocuments,
    PdfExtraction,
    Ocr,
    TableDetection,
    MetadataExtraction,
    QualityScoring,
    Deduplication,
    Curation,
}

impl CrawlSubstate {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiscoveringUrls => "discovering_urls",
            Self::DownloadingPages => "downloading_pages",
            Self::DownloadingDocuments => "downloading_documents",
            Self::PdfExtraction => "pdf_extraction",
            Self::Ocr => "ocr",
            Self::TableDetection => "table_detection",
            Self::MetadataExtraction => "metadata_extraction",
            Self::QualityScoring => "quality_scoring",
            Self::Deduplication => "deduplication",
            Self::Curation => "curation",
        }
    }

    /// Main state this substate belongs to
    #[must_use]
    pub fn parent_state(self) -> CrawlState {
        match self {
            Self::DiscoveringUrls | Self::DownloadingPages | Self::DownloadingDocuments => {
                CrawlState::Crawling
            }
            Self::PdfExtraction | Self::Ocr | Self::TableDetection => CrawlState::Extracting,
            Self::MetadataExtraction
            | Self::QualityScoring
            | Self::Deduplication
            | Self::Curation => CrawlState::Processing,
        }
    }
}

impl std::fmt::Display for CrawlSubstate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted main-state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: CrawlState,
    pub to_state: CrawlState,
    pub timestamp: DateTime<Utc>,
    /// Seconds spent in `from_state`
    pub duration_seconds: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Progress bucket tracked for every job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressCategory {
    Urls,
    Documents,
    Extractions,
    Processing,
}

impl ProgressCategory {
    pub const ALL: [ProgressCategory; 4] = [
        ProgressCategory::Urls,
        ProgressCategory::Documents,
        ProgressCategory::Extractions,
        ProgressCategory::Processing,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urls => "urls",
            Self::Documents => "documents",
            Self::Extractions => "extractions",
            Self::Processing => "processing",
        }
    }
}

/// Counters for one progress category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

impl CrawlProgress {
    /// Completed share of total in [0, 100]; 0 when total is 0
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64 * 100.0).clamp(0.0, 100.0)
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.total
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }

    /// Whether `completed + failed <= total`
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.completed.saturating_add(self.failed) <= self.total
    }
}

/// Authoritative mutable state of one job
///
/// Only `CrawlStateMachine` mutates this; everything else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlStateData {
    pub crawl_id: String,
    pub current_state: CrawlState,
    pub current_substate: Option<CrawlSubstate>,
    /// Working state the job was paused from
    pub pre_pause_state: Option<CrawlState>,
    pub pre_pause_substate: Option<CrawlSubstate>,
    pub progress: BTreeMap<ProgressCategory, CrawlProgress>,
    pub state_history: Vec<StateTransition>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub last_transition_at: DateTime<Utc>,
    pub substate_entered_at: Option<DateTime<Utc>>,

    pub error_message: Option<String>,
    pub error_count: u64,
}

impl CrawlStateData {
    #[must_use]
    pub fn new(crawl_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            crawl_id: crawl_id.into(),
            current_state: CrawlState::Queued,
            current_substate: None,
            pre_pause_state: None,
            pre_pause_substate: None,
            progress: ProgressCategory::ALL
                .into_iter()
                .map(|category| (category, CrawlProgress::default()))
                .collect(),
            state_history: Vec::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
            paused_at: None,
            last_transition_at: now,
            substate_entered_at: None,
            error_message: None,
            error_count: 0,
        }
    }

    #[must_use]
    pub fn progress(&self, category: ProgressCategory) -> CrawlProgress {
        self.progress.get(&category).copied().unwrap_or_default()
    }

    /// Mean percentage over categories that have work
    #[must_use]
    pub fn overall_progress(&self) -> f64 {
        let active: Vec<f64> = self
            .progress
            .values()
            .filter(|progress| progress.total > 0)
            .map(CrawlProgress::percentage)
            .collect();
        if active.is_empty() {
            return 0.0;
        }
        active.iter().sum::<f64>() / active.len() as f64
    }

    /// Wall-clock seconds since the job started, or since creation if it
    /// never started; stops at completion
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        let start = self.started_at.unwrap_or(self.created_at);
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - start).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Per-category progress with computed percentage
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub remaining: u64,
    pub percentage: f64,
}

impl From<CrawlProgress> for ProgressSummary {
    fn from(progress: CrawlProgress) -> Self {
        Self {
            total: progress.total,
            completed: progress.completed,
            failed: progress.failed,
            remaining: progress.remaining(),
            percentage: progress.percentage(),
        }
    }
}

/// Serializable overview returned by status queries
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub crawl_id: String,
    pub current_state: CrawlState,
    pub current_substate: Option<CrawlSubstate>,
    pub pre_pause_state: Option<CrawlState>,
    pub is_terminal: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
    pub progress: BTreeMap<ProgressCategory, ProgressSummary>,
    pub overall_progress: f64,
    pub error_message: Option<String>,
    pub error_count: u64,
    pub transition_count: usize,
}
