//! Cross-crawl metrics aggregation

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::collector::{CollectorSnapshot, MetricsCollector};
use super::system::{ProcessSampler, default_sampler};

/// System-wide view computed on demand from the live collectors
#[derive(Debug, Clone, Serialize)]
pub struct SystemSummary {
    pub active_crawls: usize,
    pub total_memory_mb: f64,
    pub avg_cpu_percent: f64,
    pub crawl_ids: Vec<String>,
}

/// Registry of per-crawl collectors
#[derive(Debug)]
pub struct MetricsAggregator {
    capacity: usize,
    collectors: DashMap<String, Arc<MetricsCollector>>,
    sampler: Arc<dyn ProcessSampler>,
}

impl MetricsAggregator {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_sampler(capacity, default_sampler())
    }

    /// Aggregator whose collectors all share `sampler`
    #[must_use]
    pub fn with_sampler(capacity: usize, sampler: Arc<dyn ProcessSampler>) -> Self {
        Self {
            capacity,
            collectors: DashMap::new(),
            sampler,
        }
    }

    pub fn get_or_create_collector(&self, crawl_id: &str) -> Arc<MetricsCollector> {
        let entry = self.collectors.entry(crawl_id.to_string()).or_insert_with(|| {
            log::debug!("Created metrics collector for crawl {crawl_id}");
            Arc::new(MetricsCollector::with_sampler(
                crawl_id,
                self.capacity,
                Arc::clone(&self.sampler),
            ))
        });
        Arc::clone(entry.value())
    }

    #[must_use]
    pub fn get_collector(&self, crawl_id: &str) -> Option<Arc<MetricsCollector>> {
        self.collectors
            .get(crawl_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a crawl's collector; returns whether one existed
    pub fn remove_collector(&self, crawl_id: &str) -> bool {
        self.collectors.remove(crawl_id).is_some()
    }

    #[must_use]
    pub fn get_all_snapshots(&self) -> BTreeMap<String, CollectorSnapshot> {
        self.collectors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get_snapshot()))
            .collect()
    }

    /// Totals across collectors from each one's latest resource samples
    #[must_use]
    pub fn get_system_summary(&self) -> SystemSummary {
        let mut crawl_ids = Vec::with_capacity(self.collectors.len());
        let mut total_memory_mb = 0.0;
        let mut cpu_samples = Vec::new();

        for entry in &self.collectors {
            crawl_ids.push(entry.key().clone());
            let collector = entry.value();
            if let Some(memory) = collector.latest("memory_usage_mb") {
                total_memory_mb += memory;
            }
            if let Some(cpu) = collector.latest("cpu_usage_percent") {
                cpu_samples.push(cpu);
            }
        }
        crawl_ids.sort();

        let avg_cpu_percent = if cpu_samples.is_empty() {
            0.0
        } else {
            cpu_samples.iter().sum::<f64>() / cpu_samples.len() as f64
        };

        SystemSummary {
            active_crawls: crawl_ids.len(),
            total_memory_mb,
            avg_cpu_percent,
            crawl_ids,
        }
    }
}
