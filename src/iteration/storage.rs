//! Iteration files on disk
//!
//! `<dir>/<iteration_id>_metadata.json` and
//! `<dir>/<iteration_id>/fingerprints.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::types::{DocumentFingerprint, IterationMetadata};
use crate::utils::{read_json, write_json_atomic};

#[must_use]
pub fn metadata_path(dir: &Path, iteration_id: &str) -> PathBuf {
    dir.join(format!("{iteration_id}_metadata.json"))
}

#[must_use]
pub fn fingerprints_path(dir: &Path, iteration_id: &str) -> PathBuf {
    dir.join(iteration_id).join("fingerprints.json")
}

pub fn save_metadata(dir: &Path, metadata: &IterationMetadata) -> std::io::Result<()> {
    write_json_atomic(&metadata_path(dir, &metadata.iteration_id), metadata)
}

pub fn save_fingerprints(
    dir: &Path,
    iteration_id: &str,
    fingerprints: &HashMap<String, DocumentFingerprint>,
) -> std::io::Result<()> {
    write_json_atomic(&fingerprints_path(dir, iteration_id), fingerprints)
}

/// Every iteration found in `dir` with its fingerprints (empty if none saved)
pub fn load_all(
    dir: &Path,
) -> std::io::Result<Vec<(IterationMetadata, HashMap<String, DocumentFingerprint>)>> {
    let mut loaded = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_metadata = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with("_metadata.json"));
        if !is_metadata {
            continue;
        }
        let metadata: IterationMetadata = match read_json(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Skipping unreadable iteration metadata {}: {e}", path.display());
                continue;
            }
        };
        let fingerprints_file = fingerprints_path(dir, &metadata.iteration_id);
        let fingerprints = if fingerprints_file.exists() {
            read_json(&fingerprints_file)?
        } else {
            HashMap::new()
        };
        loaded.push((metadata, fingerprints));
    }
    Ok(loaded)
}

/// Remove both files of an iteration
pub fn remove(dir: &Path, iteration_id: &str) -> std::io::Result<()> {
    match std::fs::remove_file(metadata_path(dir, iteration_id)) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let fingerprint_dir = dir.join(iteration_id);
    if fingerprint_dir.is_dir() {
        std::fs::remove_dir_all(fingerprint_dir)?;
    }
    Ok(())
}
