//! Human-readable delivery report for the CrawlEventBus

use std::fmt::Write;

use super::core::CrawlEventBus;

impl CrawlEventBus {
    /// Multi-line report of delivery counters and retained history
    ///
    /// Counters come from a single snapshot so the delivery rate matches the
    /// numbers printed next to it.
    #[must_use]
    pub fn get_metrics_report(&self) -> String {
        if !self.config.enable_metrics {
            return "Event bus metrics disabled".to_string();
        }

        let snapshot = self.metrics.snapshot();
        let retained_global = self.global_history.lock().len();
        let tracked_crawls = self.crawl_histories.len();

        let mut report = String::from("Crawl event bus\n");
        let rows: [(&str, String); 8] = [
            ("published", snapshot.events_published.to_string()),
            ("delivered", snapshot.events_delivered.to_string()),
            ("dropped (queue full)", snapshot.events_dropped.to_string()),
            ("subscriber failures", snapshot.subscriber_failures.to_string()),
            (
                "subscribers",
                format!("{} (peak {})", snapshot.active_subscribers, snapshot.peak_subscribers),
            ),
            ("delivery rate", format!("{:.2}%", snapshot.delivery_rate() * 100.0)),
            ("crawls with history", tracked_crawls.to_string()),
            (
                "global history",
                format!("{retained_global}/{}", self.config.history_capacity),
            ),
        ];
        for (label, value) in rows {
            // Writing into a String cannot fail
            let _ = writeln!(report, "  {label:<22}{value}");
        }
        report
    }
}
