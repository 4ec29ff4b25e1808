//! Per-crawl metrics collector

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::aggregate::{AggregatedMetrics, SeriesAggregate, WindowStats, window_duration};
use super::series::{DEFAULT_UNIT, MetricPoint, MetricSeries, STANDARD_SERIES};
use super::system::{ProcessSample, ProcessSampler, default_sampler};
use crate::utils::{DEFAULT_METRIC_SERIES_CAPACITY, DEFAULT_QUALITY_THRESHOLD};

pub type Tags = BTreeMap<String, String>;

/// Summary of a batch of quality scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Percentage of scores at or above the threshold
    pub pass_rate: f64,
}

/// Latest value of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestValue {
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of a collector
#[derive(Debug, Clone, Serialize)]
pub struct CollectorSnapshot {
    pub crawl_id: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub latest: BTreeMap<String, LatestValue>,
}

impl CollectorSnapshot {
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.latest.get(name).map(|latest| latest.value)
    }
}

/// Whole-series averages grouped by concern
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub crawl_id: String,
    pub uptime_seconds: f64,
    pub avg_pages_per_second: f64,
    pub avg_documents_per_second: f64,
    pub avg_page_time: f64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub extraction_success_rate: f64,
    pub quality_score_avg: f64,
    pub quality_pass_rate: f64,
    pub avg_memory_mb: f64,
    pub peak_memory_mb: f64,
    pub avg_cpu_percent: f64,
}

/// Time-series ingestion and windowed statistics for one crawl
///
/// Writes for one crawl come from that crawl's own control flow; the
/// interior lock lets the aggregator read concurrently.
#[derive(Debug)]
pub struct MetricsCollector {
    crawl_id: String,
    capacity: usize,
    started_at: DateTime<Utc>,
    series: RwLock<BTreeMap<String, MetricSeries>>,
    sampler: Arc<dyn ProcessSampler>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(crawl_id: impl Into<String>, capacity: usize) -> Self {
        Self::with_sampler(crawl_id, capacity, default_sampler())
    }

    #[must_use]
    pub fn with_sampler(
        crawl_id: impl Into<String>,
        capacity: usize,
        sampler: Arc<dyn ProcessSampler>,
    ) -> Self {
        let series = STANDARD_SERIES
            .iter()
            .map(|(name, unit)| ((*name).to_string(), MetricSeries::new(*name, *unit, capacity)))
            .collect();
        Self {
            crawl_id: crawl_id.into(),
            capacity,
            started_at: Utc::now(),
            series: RwLock::new(series),
            sampler,
        }
    }

    #[must_use]
    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a point stamped now
    pub fn record(&self, name: &str, value: f64, tags: Option<Tags>) {
        self.record_at(name, value, tags, Utc::now());
    }

    /// Append a point with an explicit timestamp
    ///
    /// Points are kept in arrival order; backfilled timestamps are not
    /// re-sorted.
    pub fn record_at(&self, name: &str, value: f64, tags: Option<Tags>, timestamp: DateTime<Utc>) {
        let point = MetricPoint {
            timestamp,
            value,
            tags: tags.unwrap_or_default(),
        };
        let mut series = self.series.write();
        series
            .entry(name.to_string())
            .or_insert_with(|| MetricSeries::new(name, DEFAULT_UNIT, self.capacity))
            .push(point);
    }

    /// Compute `count / elapsed` since `start_time` and record it under
    /// `metric_name`; 0 when no time has elapsed
    pub fn calculate_throughput(
        &self,
        count: u64,
        start_time: DateTime<Utc>,
        metric_name: &str,
    ) -> f64 {
        let elapsed = (Utc::now() - start_time).num_milliseconds() as f64 / 1000.0;
        let rate = if elapsed <= 0.0 {
            0.0
        } else {
            count as f64 / elapsed
        };
        self.record(metric_name, rate, None);
        rate
    }

    /// Success percentage of `successful / (successful + failed)`
    ///
    /// Records both `success_rate` and `error_rate`. With no attempts the
    /// rate is 100.
    pub fn calculate_success_rate(&self, successful: u64, failed: u64) -> f64 {
        let total = successful + failed;
        let rate = if total == 0 {
            100.0
        } else {
            successful as f64 / total as f64 * 100.0
        };
        self.record("success_rate", rate, None);
        self.record("error_rate", 100.0 - rate, None);
        rate
    }

    /// Summarize quality scores against `threshold` (default 0.7)
    ///
    /// Records `quality_score_avg` and `quality_pass_rate`. Returns `None`
    /// for an empty batch without recording.
    pub fn calculate_quality_metrics(
        &self,
        scores: &[f64],
        threshold: Option<f64>,
    ) -> Option<QualityMetrics> {
        if scores.is_empty() {
            return None;
        }
        let threshold = threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD);
        let passed = scores.iter().filter(|score| **score >= threshold).count();
        let metrics = QualityMetrics {
            count: scores.len(),
            average: scores.iter().sum::<f64>() / scores.len() as f64,
            min: scores.iter().copied().fold(f64::INFINITY, f64::min),
            max: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            pass_rate: passed as f64 / scores.len() as f64 * 100.0,
        };
        self.record("quality_score_avg", metrics.average, None);
        self.record("quality_pass_rate", metrics.pass_rate, None);
        Some(metrics)
    }

    /// Sample process resources and record them
    ///
    /// A failed sample records nothing and returns `None`.
    pub fn record_system_metrics(&self) -> Option<ProcessSample> {
        let Some(sample) = self.sampler.sample() else {
            log::debug!("Process sampling unavailable for crawl {}", self.crawl_id);
            return None;
        };
        self.record("memory_usage_mb", sample.memory_mb, None);
        if let Some(cpu) = sample.cpu_percent {
            self.record("cpu_usage_percent", cpu, None);
        }
        if let Some(threads) = sample.threads {
            self.record("thread_count", threads as f64, None);
        }
        Some(sample)
    }

    /// Window statistics for every series over `[now - window, now]`
    #[must_use]
    pub fn get_aggregated_metrics(&self, window_seconds: u64) -> AggregatedMetrics {
        self.get_aggregated_metrics_at(window_seconds, Utc::now())
    }

    /// Window statistics relative to a caller-supplied `now`
    ///
    /// Both window bounds are inclusive. Series without points in the window
    /// are present with `stats: None`.
    #[must_use]
    pub fn get_aggregated_metrics_at(
        &self,
        window_seconds: u64,
        now: DateTime<Utc>,
    ) -> AggregatedMetrics {
        let window = window_duration(window_seconds);
        let series = self.series.read();
        let aggregates = series
            .iter()
            .map(|(name, series)| {
                let values: Vec<f64> = series
                    .points_in_window(window, now)
                    .map(|point| point.value)
                    .collect();
                (
                    name.clone(),
                    SeriesAggregate {
                        unit: series.unit().to_string(),
                        stats: WindowStats::from_values(&values),
                    },
                )
            })
            .collect();

        AggregatedMetrics {
            crawl_id: self.crawl_id.clone(),
            window_seconds,
            window_start: now - window,
            window_end: now,
            series: aggregates,
        }
    }

    /// Seconds until `total` is reached at the latest rate of `rate_metric`
    ///
    /// `None` when the rate is unknown or not positive.
    #[must_use]
    pub fn estimate_completion(&self, completed: u64, total: u64, rate_metric: &str) -> Option<f64> {
        let rate = self.latest(rate_metric)?;
        if rate <= 0.0 {
            return None;
        }
        Some(total.saturating_sub(completed) as f64 / rate)
    }

    #[must_use]
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.series
            .read()
            .get(name)
            .and_then(|series| series.latest().map(|point| point.value))
    }

    #[must_use]
    pub fn series_len(&self, name: &str) -> usize {
        self.series.read().get(name).map_or(0, MetricSeries::len)
    }

    /// Points of one series, optionally limited to the last `window_seconds`
    #[must_use]
    pub fn get_time_series(&self, name: &str, window_seconds: Option<u64>) -> Vec<MetricPoint> {
        let series = self.series.read();
        let Some(series) = series.get(name) else {
            return Vec::new();
        };
        match window_seconds {
            Some(secs) => {
                series
                    .points_in_window(window_duration(secs), Utc::now())
                    .cloned()
                    .collect()
            }
            None => series.points().cloned().collect(),
        }
    }

    #[must_use]
    pub fn get_snapshot(&self) -> CollectorSnapshot {
        let now = Utc::now();
        let series = self.series.read();
        let latest = series
            .iter()
            .filter_map(|(name, series)| {
                series.latest().map(|point| {
                    (
                        name.clone(),
                        LatestValue {
                            value: point.value,
                            unit: series.unit().to_string(),
                            timestamp: point.timestamp,
                        },
                    )
                })
            })
            .collect();
        CollectorSnapshot {
            crawl_id: self.crawl_id.clone(),
            timestamp: now,
            uptime_seconds: (now - self.started_at).num_milliseconds() as f64 / 1000.0,
            latest,
        }
    }

    #[must_use]
    pub fn get_performance_summary(&self) -> PerformanceSummary {
        let series = self.series.read();
        let average = |name: &str| series.get(name).map_or(0.0, |s| s.average(None));
        let peak = |name: &str| series.get(name).and_then(|s| s.max(None)).unwrap_or(0.0);

        PerformanceSummary {
            crawl_id: self.crawl_id.clone(),
            uptime_seconds: (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0,
            avg_pages_per_second: average("pages_per_second"),
            avg_documents_per_second: average("documents_per_second"),
            avg_page_time: average("average_page_time"),
            success_rate: average("success_rate"),
            error_rate: average("error_rate"),
            extraction_success_rate: average("extraction_success_rate"),
            quality_score_avg: average("quality_score_avg"),
            quality_pass_rate: average("quality_pass_rate"),
            avg_memory_mb: average("memory_usage_mb"),
            peak_memory_mb: peak("memory_usage_mb"),
            avg_cpu_percent: average("cpu_usage_percent"),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new("default", DEFAULT_METRIC_SERIES_CAPACITY)
    }
}
