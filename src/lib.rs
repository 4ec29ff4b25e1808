pub mod checkpoint;
pub mod config;
pub mod crawl_events;
pub mod crawl_metrics;
pub mod crawl_state;
pub mod iteration;
pub mod orchestrator;
pub mod utils;

pub use checkpoint::{
    CheckpointData, CheckpointError, CheckpointManager, CheckpointMetadata, CheckpointType,
    DocumentRef, FrontierSnapshot,
};
pub use config::HarvestConfig;
pub use crawl_events::{
    CrawlEvent, CrawlEventBus, EventBusError, EventReceiver, EventType, HistoryQuery,
    SubscriptionId, SubscriptionScope,
};
pub use crawl_metrics::{AggregatedMetrics, MetricsAggregator, MetricsCollector};
pub use crawl_state::{
    CrawlProgress, CrawlState, CrawlStateData, CrawlStateMachine, CrawlSubstate, ProgressCategory,
    StateError, StateSummary,
};
pub use iteration::{
    ChangeType, IterationComparison, IterationError, IterationManager, IterationMode,
};
pub use orchestrator::{
    HarvestContext, HarvestPipeline, JobSpec, JobStatus, NoOpPipeline, Orchestrator,
    OrchestratorError, StageHandle,
};
pub use utils::RingBuffer;
