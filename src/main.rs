// Demo runner: drives one job through every stage with a synthetic
// pipeline and prints its status, metrics and event history.
//
// Configuration comes from the JSON file named by HARVEST_CONFIG, or from
// defaults rooted at HARVEST_STORAGE_DIR (./harvest-data if unset).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use kodegen_tools_harvest::checkpoint::DocumentRef;
use kodegen_tools_harvest::{
    CrawlSubstate, HarvestConfig, HarvestContext, HarvestPipeline, HistoryQuery, IterationMode,
    JobSpec, Orchestrator, StageHandle, SubscriptionScope,
};
use tracing_subscriber::EnvFilter;

/// Pretends to fetch every queued url and treats `.pdf` urls as documents
struct SyntheticPipeline;

impl SyntheticPipeline {
    async fn download_pages(handle: &StageHandle) -> Result<()> {
        for url in handle.queued_urls() {
            handle.pause_point().await?;
            let body = format!("<html>{url}</html>");
            let decision = handle.should_fetch(&url, None, None)?;
            if decision.should_fetch {
                handle.record_document(&url, body.as_bytes(), None, None)?;
            }
            handle.url_crawled(&url).await?;
            if url.ends_with(".pdf") {
                handle.document_found(&url).await;
                handle
                    .document_downloaded(DocumentRef {
                        url: url.clone(),
                        local_path: None,
                        content_hash: None,
                        size_bytes: body.len() as u64,
                    })
                    .await;
            }
        }
        Ok(())
    }
}

impl HarvestPipeline for SyntheticPipeline {
    fn run_stage<'a>(
        &'a self,
        handle: &'a StageHandle,
        substate: CrawlSubstate,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match substate {
                CrawlSubstate::DiscoveringUrls => {
                    let discovered = (0..20)
                        .map(|i| format!("https://example.org/page/{i}"))
                        .chain((0..5).map(|i| format!("https://example.org/doc/{i}.pdf")));
                    handle.urls_discovered(discovered).await;
                }
                CrawlSubstate::DownloadingPages => Self::download_pages(handle).await?,
                CrawlSubstate::PdfExtraction => {
                    for document in handle.downloaded_documents() {
                        handle.pause_point().await?;
                        handle.extraction_done(&document.url, true, None).await;
                    }
                }
                CrawlSubstate::QualityScoring => {
                    for (i, document) in handle.downloaded_documents().iter().enumerate() {
                        let score = 0.5 + (i as f64) * 0.1;
                        handle.document_processed(&document.url, Some(score)).await?;
                    }
                }
                _ => {}
            }
            Ok(())
        })
    }
}

fn load_config() -> Result<HarvestConfig> {
    if let Ok(path) = std::env::var("HARVEST_CONFIG") {
        return HarvestConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config from {path}"));
    }
    let storage_dir =
        std::env::var("HARVEST_STORAGE_DIR").unwrap_or_else(|_| "harvest-data".to_string());
    HarvestConfig::builder()
        .storage_dir(storage_dir)
        .auto_checkpoint_interval(10)
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let context = Arc::new(HarvestContext::init(config)?);
    let orchestrator = Orchestrator::new(Arc::clone(&context));

    let bus = Arc::clone(context.event_bus());
    let _subscription = bus.subscribe(SubscriptionScope::All, |event| {
        tracing::debug!(crawl_id = %event.crawl_id, event_type = %event.event_type, "event");
        Ok(())
    })?;

    let crawl_id = orchestrator
        .create_crawl(
            JobSpec::new(serde_json::json!({ "start_url": "https://example.org" }))
                .with_seed_urls(["https://example.org"])
                .with_iteration(IterationMode::Baseline),
        )
        .await?;

    let final_state = orchestrator
        .execute_crawl(&crawl_id, Arc::new(SyntheticPipeline))
        .await?;
    tracing::info!(crawl_id = %crawl_id, state = %final_state, "Run finished");

    let status = orchestrator.get_status(&crawl_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    let metrics = orchestrator.get_metrics(&crawl_id, None).await?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    let history = bus.get_history(&crawl_id, &HistoryQuery::recent(10));
    for event in history {
        println!("{} {}", event.timestamp.to_rfc3339(), event.event_type);
    }
    println!("{}", bus.get_metrics_report());

    orchestrator.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
