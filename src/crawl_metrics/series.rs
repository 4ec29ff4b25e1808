//! Bounded metric time series

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::percentile_of_sorted;
use crate::utils::RingBuffer;

/// Standard series registered on every collector, with their units
pub const STANDARD_SERIES: &[(&str, &str)] = &[
    ("pages_per_second", "pages/s"),
    ("documents_per_second", "docs/s"),
    ("bytes_per_second", "bytes/s"),
    ("average_page_time", "seconds"),
    ("average_document_time", "seconds"),
    ("memory_usage_mb", "MB"),
    ("cpu_usage_percent", "%"),
    ("success_rate", "%"),
    ("error_rate", "%"),
    ("extraction_success_rate", "%"),
    ("quality_score_avg", "score"),
    ("quality_pass_rate", "%"),
];

/// Unit used for series created on demand
pub const DEFAULT_UNIT: &str = "count";

/// One immutable sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Capacity-bounded FIFO of points for one metric name
#[derive(Debug, Clone)]
pub struct MetricSeries {
    name: String,
    unit: String,
    points: RingBuffer<MetricPoint>,
}

impl MetricSeries {
    #[must_use]
    pub fn new(name: impl Into<String>, unit: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            points: RingBuffer::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.points.capacity()
    }

    /// Append a point, evicting the oldest when full
    pub fn push(&mut self, point: MetricPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> impl DoubleEndedIterator<Item = &MetricPoint> {
        self.points.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.newest()
    }

    /// Points with `now - window <= timestamp <= now`
    pub fn points_in_window(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> impl DoubleEndedIterator<Item = &MetricPoint> {
        let start = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.points
            .iter()
            .filter(move |point| point.timestamp >= start && point.timestamp <= now)
    }

    fn values(&self, window: Option<Duration>) -> Vec<f64> {
        match window {
            Some(window) => self
                .points_in_window(window, Utc::now())
                .map(|point| point.value)
                .collect(),
            None => self.points.iter().map(|point| point.value).collect(),
        }
    }

    /// Mean over the window (whole series when `None`), 0 when empty
    #[must_use]
    pub fn average(&self, window: Option<Duration>) -> f64 {
        let values = self.values(window);
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[must_use]
    pub fn min(&self, window: Option<Duration>) -> Option<f64> {
        self.values(window).into_iter().reduce(f64::min)
    }

    #[must_use]
    pub fn max(&self, window: Option<Duration>) -> Option<f64> {
        self.values(window).into_iter().reduce(f64::max)
    }

    /// Nearest-rank percentile (`p` in [0, 100]), `None` when empty
    #[must_use]
    pub fn percentile(&self, p: f64, window: Option<Duration>) -> Option<f64> {
        let mut values = self.values(window);
        values.sort_by(f64::total_cmp);
        percentile_of_sorted(&values, p)
    }
}
