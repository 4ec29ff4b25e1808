//! Structural integrity checks for loaded checkpoints

use super::types::{CheckpointData, CheckpointMetadata};
use crate::crawl_state::CrawlState;

/// xxh3-64 of the uncompressed payload as 16 hex digits
#[must_use]
pub fn payload_checksum(payload: &[u8]) -> String {
    hex::encode(xxhash_rust::xxh3::xxh3_64(payload).to_be_bytes())
}

/// Check a decoded checkpoint against its metadata and itself
///
/// # Errors
/// Returns a human-readable reason for the first inconsistency found.
pub fn validate(metadata: &CheckpointMetadata, data: &CheckpointData) -> Result<(), String> {
    if data.checkpoint_id != metadata.checkpoint_id {
        return Err(format!(
            "payload id {} does not match metadata id {}",
            data.checkpoint_id, metadata.checkpoint_id
        ));
    }
    if data.crawl_id != metadata.crawl_id || data.state.crawl_id != metadata.crawl_id {
        return Err(format!("payload belongs to a different crawl than {}", metadata.crawl_id));
    }
    if data.state.current_state != metadata.current_state {
        return Err(format!(
            "payload state {} does not match metadata state {}",
            data.state.current_state, metadata.current_state
        ));
    }

    for (category, progress) in &data.state.progress {
        if !progress.is_consistent() {
            return Err(format!(
                "{} progress has completed {} + failed {} > total {}",
                category.as_str(),
                progress.completed,
                progress.failed,
                progress.total
            ));
        }
    }

    let frontier = &data.frontier;
    if let Some(url) = frontier.crawled_urls.intersection(&frontier.queued_urls).next() {
        return Err(format!("url {url} is both crawled and queued"));
    }

    let state = &data.state;
    if let Some(substate) = state.current_substate
        && substate.parent_state() != state.current_state
    {
        return Err(format!(
            "substate {substate} does not belong to state {}",
            state.current_state
        ));
    }
    if state.current_state == CrawlState::Paused
        && !state.pre_pause_state.is_some_and(CrawlState::is_pausable)
    {
        return Err("paused checkpoint has no valid pre-pause state".to_string());
    }
    if let Some(last) = state.state_history.last()
        && last.to_state != state.current_state
    {
        return Err(format!(
            "history ends in {} but current state is {}",
            last.to_state, state.current_state
        ));
    }

    Ok(())
}
