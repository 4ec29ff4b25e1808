//! Standard trait implementations for CrawlEventBus

use super::core::CrawlEventBus;

impl Default for CrawlEventBus {
    fn default() -> Self {
        Self::new()
    }
}
