//! Per-crawl metric time series and cross-crawl aggregation

pub mod aggregate;
pub mod aggregator;
pub mod collector;
pub mod series;
pub mod system;

pub use aggregate::{AggregatedMetrics, SeriesAggregate, WindowStats};
pub use aggregator::{MetricsAggregator, SystemSummary};
pub use collector::{CollectorSnapshot, MetricsCollector, PerformanceSummary, QualityMetrics, Tags};
pub use series::{MetricPoint, MetricSeries, STANDARD_SERIES};
pub use system::{NoOpSampler, ProcSelfSampler, ProcessSample, ProcessSampler};
