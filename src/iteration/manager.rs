//! Iteration lifecycle and change detection

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::errors::IterationError;
use super::fingerprint::{ValidatorVerdict, compare_validators, content_hash};
use super::storage;
use super::types::{
    ChangeType, CrawlDecision, DocumentFingerprint, IterationComparison, IterationMetadata,
    IterationMode, IterationStatistics, RecordOutcome,
};

#[derive(Debug)]
struct IterationRecord {
    metadata: IterationMetadata,
    fingerprints: HashMap<String, DocumentFingerprint>,
}

#[derive(Debug, Default)]
struct IterationIndex {
    iterations: HashMap<String, IterationRecord>,
    /// Per crawl, iteration ids in creation order
    by_crawl: HashMap<String, Vec<String>>,
}

impl IterationIndex {
    fn record(&self, iteration_id: &str) -> Result<&IterationRecord, IterationError> {
        self.iterations
            .get(iteration_id)
            .ok_or_else(|| IterationError::NotFound(iteration_id.to_string()))
    }

    fn open_record_mut(&mut self, iteration_id: &str) -> Result<&mut IterationRecord, IterationError> {
        let record = self
            .iterations
            .get_mut(iteration_id)
            .ok_or_else(|| IterationError::NotFound(iteration_id.to_string()))?;
        if record.metadata.is_completed() {
            return Err(IterationError::Completed(iteration_id.to_string()));
        }
        Ok(record)
    }

    /// Most recent fingerprint of `url` in the lineage before `iteration_id`
    ///
    /// Walks parent links back to (and including) the baseline. Baseline
    /// iterations have no reference.
    fn reference_fingerprint(&self, iteration_id: &str, url: &str) -> Option<&DocumentFingerprint> {
        let metadata = &self.iterations.get(iteration_id)?.metadata;
        let baseline = metadata.baseline_iteration_id.as_deref()?;
        let mut cursor = metadata.parent_iteration_id.as_deref();

        while let Some(id) = cursor {
            let record = self.iterations.get(id)?;
            if let Some(fingerprint) = record.fingerprints.get(url) {
                return Some(fingerprint);
            }
            if id == baseline {
                break;
            }
            cursor = record.metadata.parent_iteration_id.as_deref();
        }
        None
    }

    fn compare(&self, baseline_id: &str, current_id: &str) -> Result<IterationComparison, IterationError> {
        let baseline = &self.record(baseline_id)?.fingerprints;
        let current = &self.record(current_id)?.fingerprints;

        let mut comparison = IterationComparison {
            baseline_id: baseline_id.to_string(),
            current_id: current_id.to_string(),
            ..IterationComparison::default()
        };
        for (url, fingerprint) in current {
            match baseline.get(url) {
                None => comparison.new.insert(url.clone()),
                Some(prior) if prior.content_hash == fingerprint.content_hash => {
                    comparison.unchanged.insert(url.clone())
                }
                Some(_) => comparison.modified.insert(url.clone()),
            };
        }
        comparison.removed = baseline
            .keys()
            .filter(|url| !current.contains_key(*url))
            .cloned()
            .collect::<BTreeSet<_>>();
        Ok(comparison)
    }
}

/// Tracks fingerprints across repeated passes over the same target set
#[derive(Debug)]
pub struct IterationManager {
    storage_dir: PathBuf,
    index: RwLock<IterationIndex>,
}

impl IterationManager {
    /// Open (creating if needed) an iteration store and load existing passes
    ///
    /// # Errors
    /// Returns `IterationError::Io` if the directory or a fingerprint file
    /// cannot be read.
    pub fn open(storage_dir: impl Into<PathBuf>) -> Result<Self, IterationError> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;

        let mut loaded = storage::load_all(&storage_dir)?;
        loaded.sort_by_key(|(metadata, _)| metadata.iteration_number);

        let mut index = IterationIndex::default();
        for (metadata, fingerprints) in loaded {
            index
                .by_crawl
                .entry(metadata.crawl_id.clone())
                .or_default()
                .push(metadata.iteration_id.clone());
            index.iterations.insert(
                metadata.iteration_id.clone(),
                IterationRecord {
                    metadata,
                    fingerprints,
                },
            );
        }
        log::info!(
            "Loaded {} iterations from {}",
            index.iterations.len(),
            storage_dir.display()
        );

        Ok(Self {
            storage_dir,
            index: RwLock::new(index),
        })
    }

    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Start a new pass for a crawl
    ///
    /// The new iteration's parent is the crawl's previous iteration and its
    /// baseline is the most recent `Baseline` pass.
    ///
    /// # Errors
    /// * `NoBaseline` - `Incremental` requested before any baseline exists
    /// * `Io` - metadata could not be written
    pub fn create_iteration(
        &self,
        crawl_id: &str,
        config: Value,
        mode: IterationMode,
    ) -> Result<IterationMetadata, IterationError> {
        let metadata = {
            let mut index = self.index.write();
            let existing = index.by_crawl.get(crawl_id).cloned().unwrap_or_default();

            let latest_baseline = existing.iter().rev().find(|id| {
                index
                    .iterations
                    .get(*id)
                    .is_some_and(|record| record.metadata.mode == IterationMode::Baseline)
            });
            if mode == IterationMode::Incremental && latest_baseline.is_none() {
                return Err(IterationError::NoBaseline {
                    crawl_id: crawl_id.to_string(),
                });
            }

            let iteration_number = existing
                .iter()
                .filter_map(|id| index.iterations.get(id))
                .map(|record| record.metadata.iteration_number)
                .max()
                .unwrap_or(0)
                + 1;

            let metadata = IterationMetadata {
                iteration_id: format!("{crawl_id}_iter_{iteration_number}"),
                crawl_id: crawl_id.to_string(),
                iteration_number,
                mode,
                created_at: Utc::now(),
                completed_at: None,
                parent_iteration_id: existing.last().cloned(),
                baseline_iteration_id: match mode {
                    IterationMode::Baseline => None,
                    _ => latest_baseline.cloned(),
                },
                config,
                stats: Map::new(),
            };

            index
                .by_crawl
                .entry(crawl_id.to_string())
                .or_default()
                .push(metadata.iteration_id.clone());
            index.iterations.insert(
                metadata.iteration_id.clone(),
                IterationRecord {
                    metadata: metadata.clone(),
                    fingerprints: HashMap::new(),
                },
            );
            metadata
        };

        storage::save_metadata(&self.storage_dir, &metadata)?;
        log::info!(
            "Created {} iteration {} (baseline: {})",
            metadata.mode,
            metadata.iteration_id,
            metadata.baseline_iteration_id.as_deref().unwrap_or("none")
        );
        Ok(metadata)
    }

    /// Decide from cache validators whether `url` must be fetched
    ///
    /// Baseline passes fetch everything as new. Full passes fetch everything
    /// and report `Modified` for urls with a prior fingerprint. Incremental
    /// passes skip urls whose validators show no change and carry the prior
    /// fingerprint forward into this iteration.
    ///
    /// # Errors
    /// * `NotFound` - unknown iteration
    /// * `Completed` - iteration is frozen
    pub fn should_crawl_url(
        &self,
        iteration_id: &str,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<CrawlDecision, IterationError> {
        let mut index = self.index.write();
        let mode = index.open_record_mut(iteration_id)?.metadata.mode;

        let Some(reference) = index.reference_fingerprint(iteration_id, url).cloned() else {
            return Ok(CrawlDecision::fetch(ChangeType::New));
        };

        match mode {
            IterationMode::Baseline => Ok(CrawlDecision::fetch(ChangeType::New)),
            IterationMode::Full => Ok(CrawlDecision::fetch(ChangeType::Modified)),
            IterationMode::Incremental => match compare_validators(&reference, etag, last_modified) {
                ValidatorVerdict::Unchanged => {
                    let carried = DocumentFingerprint {
                        iteration_id: iteration_id.to_string(),
                        ..reference
                    };
                    index
                        .open_record_mut(iteration_id)?
                        .fingerprints
                        .insert(url.to_string(), carried);
                    Ok(CrawlDecision::skip())
                }
                ValidatorVerdict::Changed | ValidatorVerdict::Unknown => {
                    Ok(CrawlDecision::fetch(ChangeType::Modified))
                }
            },
        }
    }

    /// Fingerprint fetched content and classify it against the lineage
    ///
    /// Re-recording a url within the same iteration supersedes the earlier
    /// fingerprint.
    ///
    /// # Errors
    /// * `NotFound` - unknown iteration
    /// * `Completed` - iteration is frozen
    pub fn record_document(
        &self,
        iteration_id: &str,
        url: &str,
        content: &[u8],
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<RecordOutcome, IterationError> {
        let fingerprint = DocumentFingerprint {
            url: url.to_string(),
            content_hash: content_hash(content),
            content_size: content.len() as u64,
            etag: etag.map(str::to_string),
            last_modified: last_modified.map(str::to_string),
            iteration_id: iteration_id.to_string(),
            recorded_at: Utc::now(),
        };

        let mut index = self.index.write();
        index.open_record_mut(iteration_id)?;

        let change_type = match index.reference_fingerprint(iteration_id, url) {
            None => ChangeType::New,
            Some(prior) if prior.content_hash == fingerprint.content_hash => ChangeType::Unchanged,
            Some(_) => ChangeType::Modified,
        };

        index
            .open_record_mut(iteration_id)?
            .fingerprints
            .insert(url.to_string(), fingerprint.clone());

        log::debug!("Recorded {url} in {iteration_id} as {change_type:?}");
        Ok(RecordOutcome {
            fingerprint,
            change_type,
        })
    }

    /// Url-level diff of two iterations' fingerprint maps
    ///
    /// # Errors
    /// * `NotFound` - either iteration is unknown
    pub fn compare_iterations(
        &self,
        baseline_id: &str,
        current_id: &str,
    ) -> Result<IterationComparison, IterationError> {
        self.index.read().compare(baseline_id, current_id)
    }

    /// Freeze an iteration and persist it
    ///
    /// `stats` are merged into the iteration's stats, along with
    /// new/modified/unchanged/removed counts against the baseline when there
    /// is one.
    ///
    /// # Errors
    /// * `NotFound` / `Completed`
    /// * `Io` - files could not be written; the iteration stays open
    pub fn complete_iteration(
        &self,
        iteration_id: &str,
        stats: Map<String, Value>,
    ) -> Result<IterationMetadata, IterationError> {
        let mut index = self.index.write();
        let record = index.open_record_mut(iteration_id)?;
        let mut metadata = record.metadata.clone();

        metadata.stats.extend(stats);
        metadata
            .stats
            .insert("documents".into(), Value::from(record.fingerprints.len()));
        if let Some(baseline_id) = metadata.baseline_iteration_id.clone() {
            let comparison = index.compare(&baseline_id, iteration_id)?;
            for (key, count) in comparison.counts() {
                metadata.stats.insert(key.into(), Value::from(count));
            }
        }
        metadata.completed_at = Some(Utc::now());

        let record = index.open_record_mut(iteration_id)?;
        storage::save_fingerprints(&self.storage_dir, iteration_id, &record.fingerprints)?;
        storage::save_metadata(&self.storage_dir, &metadata)?;
        record.metadata = metadata.clone();

        log::info!(
            "Completed iteration {iteration_id} with {} documents",
            record.fingerprints.len()
        );
        Ok(metadata)
    }

    #[must_use]
    pub fn get_iteration(&self, iteration_id: &str) -> Option<IterationMetadata> {
        self.index
            .read()
            .iterations
            .get(iteration_id)
            .map(|record| record.metadata.clone())
    }

    /// Iterations of a crawl in creation order
    #[must_use]
    pub fn get_iterations_for_crawl(&self, crawl_id: &str) -> Vec<IterationMetadata> {
        let index = self.index.read();
        index
            .by_crawl
            .get(crawl_id)
            .into_iter()
            .flatten()
            .filter_map(|id| index.iterations.get(id))
            .map(|record| record.metadata.clone())
            .collect()
    }

    #[must_use]
    pub fn get_latest_iteration(&self, crawl_id: &str) -> Option<IterationMetadata> {
        self.get_iterations_for_crawl(crawl_id).pop()
    }

    /// Ancestors of an iteration followed by the iteration itself, oldest first
    #[must_use]
    pub fn get_iteration_chain(&self, iteration_id: &str) -> Vec<IterationMetadata> {
        let index = self.index.read();
        let mut chain = Vec::new();
        let mut cursor = Some(iteration_id);
        while let Some(id) = cursor {
            let Some(record) = index.iterations.get(id) else {
                break;
            };
            chain.push(record.metadata.clone());
            cursor = record.metadata.parent_iteration_id.as_deref();
        }
        chain.reverse();
        chain
    }

    /// Fingerprints held by one iteration, ordered by url
    #[must_use]
    pub fn get_fingerprints(&self, iteration_id: &str) -> Vec<DocumentFingerprint> {
        let index = self.index.read();
        let mut fingerprints: Vec<_> = index
            .iterations
            .get(iteration_id)
            .map(|record| record.fingerprints.values().cloned().collect())
            .unwrap_or_default();
        fingerprints.sort_by(|a, b| a.url.cmp(&b.url));
        fingerprints
    }

    #[must_use]
    pub fn get_statistics(&self) -> IterationStatistics {
        let index = self.index.read();
        let mut stats = IterationStatistics {
            total_iterations: index.iterations.len(),
            crawls: index.by_crawl.len(),
            ..IterationStatistics::default()
        };
        for record in index.iterations.values() {
            if record.metadata.is_completed() {
                stats.completed_iterations += 1;
            }
            stats.total_fingerprints += record.fingerprints.len();
            *stats.by_mode.entry(record.metadata.mode).or_default() += 1;
        }
        stats
    }

    /// Delete every iteration of a crawl from memory and disk
    pub fn remove_crawl(&self, crawl_id: &str) -> Result<usize, IterationError> {
        let mut index = self.index.write();
        let ids = index.by_crawl.remove(crawl_id).unwrap_or_default();
        for id in &ids {
            index.iterations.remove(id);
            storage::remove(&self.storage_dir, id)?;
        }
        Ok(ids.len())
    }
}
