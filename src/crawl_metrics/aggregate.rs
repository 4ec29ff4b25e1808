//! Windowed aggregation results

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Longest accepted aggregation window: 100 years
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Window length as a `Duration`, capped so `now - window` cannot overflow
#[must_use]
pub fn window_duration(window_seconds: u64) -> Duration {
    Duration::seconds(window_seconds.min(MAX_WINDOW_SECS) as i64)
}

/// Nearest-rank percentile over ascending values
///
/// Uses index `floor(len * p / 100)` clamped to the last element.
#[must_use]
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let index = ((sorted.len() as f64 * p / 100.0).floor() as usize).min(sorted.len() - 1);
    Some(sorted[index])
}

/// Statistics over the points of one series inside the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub count: usize,
    pub latest: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl WindowStats {
    /// Compute stats from values in chronological order
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let latest = *values.last()?;
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            count: values.len(),
            latest,
            avg: values.iter().sum::<f64>() / values.len() as f64,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: percentile_of_sorted(&sorted, 50.0)?,
            p95: percentile_of_sorted(&sorted, 95.0)?,
            p99: percentile_of_sorted(&sorted, 99.0)?,
        })
    }
}

/// Aggregate for one series; `stats` is `None` when no point fell in the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesAggregate {
    pub unit: String,
    pub stats: Option<WindowStats>,
}

impl SeriesAggregate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_none()
    }
}

/// Result of `get_aggregated_metrics`
///
/// The window is inclusive at both ends: `[window_start, window_end]`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedMetrics {
    pub crawl_id: String,
    pub window_seconds: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub series: BTreeMap<String, SeriesAggregate>,
}

impl AggregatedMetrics {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SeriesAggregate> {
        self.series.get(name)
    }

    /// True when no series had a point inside the window
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.values().all(SeriesAggregate::is_empty)
    }
}
