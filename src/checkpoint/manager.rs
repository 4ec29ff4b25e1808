//! Checkpoint creation, lookup, resume and pruning

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::errors::CheckpointError;
use super::storage::{
    blob_path, metadata_path, read_blob, remove_if_exists, scan_metadata, write_blob,
    write_metadata,
};
use super::types::{
    CheckpointData, CheckpointMetadata, CheckpointStatistics, CheckpointType, FrontierSnapshot,
};
use super::validation::{payload_checksum, validate};
use crate::crawl_state::CrawlStateData;

#[derive(Debug, Default)]
struct CheckpointIndex {
    /// Per crawl, ordered by checkpoint number (oldest first)
    by_crawl: HashMap<String, Vec<CheckpointMetadata>>,
    /// Next number to hand out per crawl; never decreases
    next_number: HashMap<String, u64>,
}

/// Durable, compressed job snapshots
///
/// Writes for one crawl are serialized by a per-crawl async lock. Reads take
/// no write lock: blobs and metadata are replaced by atomic rename, so a
/// reader sees either the old file or the new one.
#[derive(Debug)]
pub struct CheckpointManager {
    storage_dir: PathBuf,
    io_timeout: Duration,
    index: RwLock<CheckpointIndex>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

pub(crate) fn is_safe_crawl_id(crawl_id: &str) -> bool {
    !crawl_id.is_empty()
        && crawl_id != "."
        && crawl_id != ".."
        && !crawl_id.contains(['/', '\\', '\0'])
}

impl CheckpointManager {
    /// Open (creating if needed) a checkpoint store and load existing metadata
    ///
    /// # Errors
    /// Returns `CheckpointError::Io` if the directory cannot be created or read.
    pub fn open(storage_dir: impl Into<PathBuf>, io_timeout: Duration) -> Result<Self, CheckpointError> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;

        let mut index = CheckpointIndex::default();
        for metadata in scan_metadata(&storage_dir)? {
            let next = index.next_number.entry(metadata.crawl_id.clone()).or_insert(1);
            *next = (*next).max(metadata.checkpoint_number + 1);
            index
                .by_crawl
                .entry(metadata.crawl_id.clone())
                .or_default()
                .push(metadata);
        }
        let mut loaded = 0;
        for checkpoints in index.by_crawl.values_mut() {
            checkpoints.sort_by_key(|metadata| metadata.checkpoint_number);
            loaded += checkpoints.len();
        }
        log::info!(
            "Loaded {loaded} checkpoints for {} crawls from {}",
            index.by_crawl.len(),
            storage_dir.display()
        );

        Ok(Self {
            storage_dir,
            io_timeout,
            index: RwLock::new(index),
            write_locks: DashMap::new(),
        })
    }

    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn crawl_dir(&self, crawl_id: &str) -> PathBuf {
        self.storage_dir.join(crawl_id)
    }

    fn write_lock(&self, crawl_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.write_locks
                .entry(crawl_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Snapshot a job to durable storage
    ///
    /// The payload blob is written first and the metadata file second; the
    /// checkpoint only becomes visible once both are in place. A failed
    /// write leaves every earlier checkpoint untouched.
    ///
    /// # Errors
    /// * `InvalidCrawlId` - the crawl id is not usable as a directory name
    /// * `Io` / `WriteTimeout` / `TaskFailed` - the write did not complete
    pub async fn create_checkpoint(
        &self,
        state: &CrawlStateData,
        frontier: &FrontierSnapshot,
        checkpoint_type: CheckpointType,
        metadata: Option<Map<String, Value>>,
    ) -> Result<CheckpointMetadata, CheckpointError> {
        let crawl_id = state.crawl_id.clone();
        if !is_safe_crawl_id(&crawl_id) {
            return Err(CheckpointError::InvalidCrawlId(crawl_id));
        }

        let lock = self.write_lock(&crawl_id);
        let _guard = lock.lock().await;

        let checkpoint_number = {
            let mut index = self.index.write();
            let next = index.next_number.entry(crawl_id.clone()).or_insert(1);
            let number = *next;
            *next += 1;
            number
        };
        let checkpoint_id = format!("{crawl_id}_ckpt_{checkpoint_number}");
        let created_at = Utc::now();

        let data = CheckpointData {
            checkpoint_id: checkpoint_id.clone(),
            crawl_id: crawl_id.clone(),
            created_at,
            checkpoint_type,
            state: state.clone(),
            frontier: frontier.clone(),
        };
        let payload = serde_json::to_vec(&data)?;
        let checksum = payload_checksum(&payload);

        let crawl_dir = self.crawl_dir(&crawl_id);
        let blob = blob_path(&crawl_dir, &checkpoint_id);
        let compressed_size_bytes = write_blob(blob.clone(), payload, self.io_timeout).await?;

        let checkpoint = CheckpointMetadata {
            checkpoint_id: checkpoint_id.clone(),
            crawl_id: crawl_id.clone(),
            created_at,
            checkpoint_type,
            can_resume: !state.current_state.is_terminal(),
            checkpoint_number,
            current_state: state.current_state,
            current_substate: state.current_substate,
            overall_progress: state.overall_progress(),
            urls_crawled: frontier.crawled_urls.len(),
            urls_queued: frontier.queued_urls.len(),
            compressed_size_bytes,
            payload_checksum: checksum,
            metadata: metadata.unwrap_or_default(),
        };

        if let Err(e) = write_metadata(
            metadata_path(&crawl_dir, &checkpoint_id),
            checkpoint.clone(),
            self.io_timeout,
        )
        .await
        {
            // An orphaned blob is never listed; drop it so it does not linger
            if let Err(cleanup) = remove_if_exists(&blob) {
                log::debug!("Could not remove orphaned blob {}: {cleanup}", blob.display());
            }
            return Err(e);
        }

        self.index
            .write()
            .by_crawl
            .entry(crawl_id.clone())
            .or_default()
            .push(checkpoint.clone());

        log::info!(
            "Created {checkpoint_type} checkpoint {checkpoint_id} ({compressed_size_bytes} bytes, state {})",
            state.current_state
        );
        Ok(checkpoint)
    }

    /// Most recently created checkpoint of a crawl
    #[must_use]
    pub fn get_latest_checkpoint(&self, crawl_id: &str) -> Option<CheckpointMetadata> {
        self.index
            .read()
            .by_crawl
            .get(crawl_id)
            .and_then(|checkpoints| checkpoints.last().cloned())
    }

    #[must_use]
    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Option<CheckpointMetadata> {
        self.index
            .read()
            .by_crawl
            .values()
            .flatten()
            .find(|metadata| metadata.checkpoint_id == checkpoint_id)
            .cloned()
    }

    /// All checkpoints of a crawl, oldest first
    #[must_use]
    pub fn get_checkpoints_for_crawl(&self, crawl_id: &str) -> Vec<CheckpointMetadata> {
        self.index
            .read()
            .by_crawl
            .get(crawl_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the crawl's latest checkpoint can be resumed
    #[must_use]
    pub fn can_resume(&self, crawl_id: &str) -> bool {
        self.get_latest_checkpoint(crawl_id)
            .is_some_and(|metadata| metadata.can_resume)
    }

    /// Load a checkpoint for resumption
    ///
    /// The payload checksum is always verified. With `validate`, the
    /// consistency of the decoded snapshot and its resumability are checked
    /// as well.
    ///
    /// # Errors
    /// * `NotFound` - no such checkpoint
    /// * `Corrupt` - payload missing, undecodable or inconsistent
    /// * `NotResumable` - snapshot was taken in a terminal state
    pub async fn resume_from_checkpoint(
        &self,
        checkpoint_id: &str,
        validate_data: bool,
    ) -> Result<CheckpointData, CheckpointError> {
        let metadata = self
            .get_checkpoint(checkpoint_id)
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;

        let blob = blob_path(&self.crawl_dir(&metadata.crawl_id), checkpoint_id);
        let payload = read_blob(checkpoint_id.to_string(), blob, self.io_timeout).await?;

        let actual = payload_checksum(&payload);
        if actual != metadata.payload_checksum {
            return Err(CheckpointError::corrupt(
                checkpoint_id,
                format!(
                    "payload checksum {actual} does not match recorded {}",
                    metadata.payload_checksum
                ),
            ));
        }

        let data: CheckpointData = serde_json::from_slice(&payload).map_err(|e| {
            CheckpointError::corrupt(checkpoint_id, format!("payload does not decode: {e}"))
        })?;

        if validate_data {
            validate(&metadata, &data)
                .map_err(|reason| CheckpointError::corrupt(checkpoint_id, reason))?;
            if data.state.current_state.is_terminal() {
                return Err(CheckpointError::NotResumable {
                    checkpoint_id: checkpoint_id.to_string(),
                    state: data.state.current_state,
                });
            }
        }

        log::info!(
            "Loaded checkpoint {checkpoint_id} for crawl {} ({} crawled, {} queued)",
            data.crawl_id,
            data.frontier.crawled_urls.len(),
            data.frontier.queued_urls.len()
        );
        Ok(data)
    }

    /// Delete one checkpoint
    ///
    /// # Returns
    /// Whether the checkpoint existed
    pub async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool, CheckpointError> {
        let Some(metadata) = self.get_checkpoint(checkpoint_id) else {
            return Ok(false);
        };
        let lock = self.write_lock(&metadata.crawl_id);
        let _guard = lock.lock().await;
        self.remove_files(&metadata)?;
        Ok(true)
    }

    /// Keep only the `keep_last` most recently created checkpoints of a crawl
    ///
    /// # Returns
    /// Number of checkpoints deleted
    pub async fn delete_old_checkpoints(
        &self,
        crawl_id: &str,
        keep_last: usize,
    ) -> Result<usize, CheckpointError> {
        let lock = self.write_lock(crawl_id);
        let _guard = lock.lock().await;

        let checkpoints = self.get_checkpoints_for_crawl(crawl_id);
        let excess = checkpoints.len().saturating_sub(keep_last);
        if excess == 0 {
            return Ok(0);
        }

        for metadata in &checkpoints[..excess] {
            self.remove_files(metadata)?;
        }

        log::debug!("Pruned {excess} checkpoints of crawl {crawl_id}, kept {keep_last}");
        Ok(excess)
    }

    /// Delete every checkpoint of a crawl and its directory
    pub async fn remove_crawl(&self, crawl_id: &str) -> Result<usize, CheckpointError> {
        let removed = self.delete_old_checkpoints(crawl_id, 0).await?;
        {
            let mut index = self.index.write();
            index.by_crawl.remove(crawl_id);
        }
        let crawl_dir = self.crawl_dir(crawl_id);
        if is_safe_crawl_id(crawl_id) && crawl_dir.is_dir() {
            std::fs::remove_dir_all(&crawl_dir)?;
        }
        self.write_locks.remove(crawl_id);
        Ok(removed)
    }

    #[must_use]
    pub fn get_statistics(&self) -> CheckpointStatistics {
        let index = self.index.read();
        let mut stats = CheckpointStatistics {
            crawls_with_checkpoints: index.by_crawl.values().filter(|c| !c.is_empty()).count(),
            ..CheckpointStatistics::default()
        };
        for metadata in index.by_crawl.values().flatten() {
            stats.total_checkpoints += 1;
            stats.total_size_bytes += metadata.compressed_size_bytes;
            *stats.by_type.entry(metadata.checkpoint_type).or_default() += 1;
        }
        stats
    }

    /// Remove one checkpoint's files, dropping it from the index as soon as
    /// its metadata file is gone
    fn remove_files(&self, metadata: &CheckpointMetadata) -> Result<(), CheckpointError> {
        let crawl_dir = self.crawl_dir(&metadata.crawl_id);
        // Metadata first: once it is gone the checkpoint is no longer listed
        remove_if_exists(&metadata_path(&crawl_dir, &metadata.checkpoint_id))?;
        self.forget(&metadata.crawl_id, |m| m.checkpoint_id == metadata.checkpoint_id);
        remove_if_exists(&blob_path(&crawl_dir, &metadata.checkpoint_id))?;
        log::debug!("Deleted checkpoint {}", metadata.checkpoint_id);
        Ok(())
    }

    fn forget(&self, crawl_id: &str, matches: impl Fn(&CheckpointMetadata) -> bool) {
        let mut index = self.index.write();
        if let Some(checkpoints) = index.by_crawl.get_mut(crawl_id) {
            checkpoints.retain(|metadata| !matches(metadata));
        }
    }
}
