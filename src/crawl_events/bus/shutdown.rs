//! Shutdown operations for the CrawlEventBus

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::crawl_events::errors::EventBusError;

use super::core::CrawlEventBus;

impl CrawlEventBus {
    /// Check if shutdown has been signaled
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Stop accepting events and drain subscriber workers
    ///
    /// 1. **Set shutdown flag** - `publish` and `subscribe` start failing
    /// 2. **Close every queue** - dropping the senders lets each worker
    ///    finish the events already queued
    /// 3. **Await workers** - bounded by `drain_timeout`
    ///
    /// This method is idempotent.
    ///
    /// # Errors
    /// * `EventBusError::DrainTimeout` - Some workers were still running when
    ///   the timeout elapsed; they are left to finish in the background
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<(), EventBusError> {
        self.shutdown_flag.store(true, Ordering::SeqCst);

        let workers: Vec<_> = {
            let mut subscribers = self.subscribers.write();
            subscribers
                .drain()
                .filter_map(|(_, subscriber)| subscriber.worker)
                .collect()
        };
        self.refresh_subscriber_count();
        log::debug!("Event bus shutdown signaled, draining {} workers", workers.len());

        let deadline = tokio::time::Instant::now() + drain_timeout;
        let mut pending = 0;
        for worker in workers {
            if tokio::time::timeout_at(deadline, worker).await.is_err() {
                pending += 1;
            }
        }

        if pending > 0 {
            log::warn!("Event bus drain timed out with {pending} workers still running");
            return Err(EventBusError::DrainTimeout {
                pending_workers: pending,
            });
        }
        log::info!("Event bus shut down cleanly");
        Ok(())
    }
}
