//! Shared helpers for the harvest test suite

use std::sync::Arc;
use std::time::Duration;

use kodegen_tools_harvest::checkpoint::{DocumentRef, FrontierSnapshot};
use kodegen_tools_harvest::config::HarvestConfig;
use kodegen_tools_harvest::crawl_state::{CrawlState, CrawlStateMachine, ProgressCategory};
use kodegen_tools_harvest::crawl_events::CrawlEventBus;
use tempfile::TempDir;

/// Config rooted in a fresh temp dir; keep the `TempDir` alive for the test
#[allow(dead_code)]
pub fn test_config() -> (TempDir, HarvestConfig) {
    let dir = TempDir::new().expect("temp dir");
    let config = HarvestConfig::builder()
        .storage_dir(dir.path())
        .build()
        .expect("valid config");
    (dir, config)
}

/// Machine driven to CRAWLING with some progress recorded
#[allow(dead_code)]
pub fn crawling_machine(crawl_id: &str) -> CrawlStateMachine {
    let mut machine = CrawlStateMachine::new(crawl_id, Arc::new(CrawlEventBus::new()));
    machine
        .transition(CrawlState::Initializing, None)
        .expect("queued -> initializing");
    machine
        .transition(CrawlState::Crawling, None)
        .expect("initializing -> crawling");
    machine.update_progress(ProgressCategory::Urls, Some(3), Some(1), Some(10));
    machine.update_progress(ProgressCategory::Documents, Some(1), Some(0), Some(2));
    machine
}

/// Frontier consistent with `crawling_machine`
#[allow(dead_code)]
pub fn sample_frontier() -> FrontierSnapshot {
    FrontierSnapshot {
        crawled_urls: ["https://a.test/1", "https://a.test/2", "https://a.test/3"]
            .into_iter()
            .map(String::from)
            .collect(),
        queued_urls: ["https://a.test/4", "https://a.test/5"]
            .into_iter()
            .map(String::from)
            .collect(),
        failed_urls: ["https://a.test/bad"].into_iter().map(String::from).collect(),
        downloaded_documents: vec![DocumentRef {
            url: "https://a.test/doc.pdf".into(),
            local_path: Some("docs/doc.pdf".into()),
            content_hash: Some("abc".into()),
            size_bytes: 1024,
        }],
        processed_documents: Default::default(),
        config: serde_json::json!({ "max_depth": 2 }),
    }
}

/// Poll `check` until it holds or `limit` passes
#[allow(dead_code)]
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
