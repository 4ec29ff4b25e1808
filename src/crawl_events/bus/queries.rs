//! History queries and per-crawl cleanup for the CrawlEventBus

use std::sync::Arc;

use crate::crawl_events::types::{CrawlEvent, HistoryQuery, SubscriptionScope};

use super::core::CrawlEventBus;

impl CrawlEventBus {
    /// Filtered slice of one crawl's history, oldest first
    ///
    /// Unknown crawl ids yield an empty vector.
    #[must_use]
    pub fn get_history(&self, crawl_id: &str, query: &HistoryQuery) -> Vec<Arc<CrawlEvent>> {
        let Some(history) = self
            .crawl_histories
            .get(crawl_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return Vec::new();
        };
        history.lock().query(query)
    }

    /// Filtered slice of the global history across all crawls
    #[must_use]
    pub fn get_global_history(&self, query: &HistoryQuery) -> Vec<Arc<CrawlEvent>> {
        self.global_history.lock().query(query)
    }

    /// Clear one crawl's history, or every history when `crawl_id` is `None`
    pub fn clear_history(&self, crawl_id: Option<&str>) {
        match crawl_id {
            Some(id) => {
                if let Some(history) = self.crawl_histories.get(id) {
                    history.value().lock().clear();
                }
            }
            None => {
                self.crawl_histories.clear();
                self.global_history.lock().clear();
            }
        }
    }

    /// Release a finished crawl's history and crawl-scoped subscriptions
    ///
    /// Wildcard subscriptions are untouched and the crawl's events remain in
    /// the global history until evicted.
    ///
    /// # Returns
    /// Number of subscriptions removed
    pub fn cleanup_crawl(&self, crawl_id: &str) -> usize {
        self.crawl_histories.remove(crawl_id);

        let removed = {
            let mut subscribers = self.subscribers.write();
            let before = subscribers.len();
            subscribers.retain(|_, subscriber| {
                !matches!(&subscriber.scope, SubscriptionScope::Crawl(id) if id == crawl_id)
            });
            before - subscribers.len()
        };
        self.refresh_subscriber_count();

        log::debug!("Cleaned up crawl {crawl_id}: {removed} subscriptions released");
        removed
    }
}
