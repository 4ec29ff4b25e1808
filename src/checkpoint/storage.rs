//! Compressed checkpoint blobs on disk
//!
//! All compression and file I/O runs on the blocking pool so the async
//! runtime is never stalled by a slow disk.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use tempfile::NamedTempFile;
use tokio::time::timeout;

use super::errors::CheckpointError;
use super::types::CheckpointMetadata;
use crate::utils::{CHECKPOINT_COMPRESSION_LEVEL, read_json, write_json_atomic};

/// `<crawl_dir>/<checkpoint_id>.json.gz`
#[must_use]
pub fn blob_path(crawl_dir: &Path, checkpoint_id: &str) -> PathBuf {
    crawl_dir.join(format!("{checkpoint_id}.json.gz"))
}

/// `<crawl_dir>/<checkpoint_id>_meta.json`
#[must_use]
pub fn metadata_path(crawl_dir: &Path, checkpoint_id: &str) -> PathBuf {
    crawl_dir.join(format!("{checkpoint_id}_meta.json"))
}

/// Run blocking checkpoint I/O with a timeout
async fn run_blocking<T, F>(
    op_timeout: Duration,
    description: String,
    op: F,
) -> Result<T, CheckpointError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CheckpointError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(op);
    match timeout(op_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(CheckpointError::TaskFailed(format!(
            "Blocking checkpoint task panicked: {e}"
        ))),
        Err(_) => {
            log::warn!("Checkpoint I/O timeout: {description} (timeout: {op_timeout:?})");
            Err(CheckpointError::WriteTimeout(op_timeout))
        }
    }
}

/// Gzip `payload` into `path` through a temp file in the same directory
///
/// The final rename is atomic, so an interrupted write never replaces or
/// damages an existing file.
///
/// # Returns
/// Size in bytes of the compressed file
pub async fn write_blob(
    path: PathBuf,
    payload: Vec<u8>,
    op_timeout: Duration,
) -> Result<u64, CheckpointError> {
    let description = format!("{} ({} bytes)", path.display(), payload.len());
    run_blocking(op_timeout, description, move || {
        let parent_dir = path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no parent directory")
        })?;
        std::fs::create_dir_all(parent_dir)?;

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("checkpoint.json")
            .trim_end_matches(".gz")
            .to_string();

        // Create temp file in same directory as target (ATOMIC)
        let temp_file = NamedTempFile::new_in(parent_dir)?;
        let mut gz = GzBuilder::new()
            .filename(filename)
            .write(temp_file, Compression::new(CHECKPOINT_COMPRESSION_LEVEL));
        gz.write_all(&payload)?;
        let temp_file = gz.finish()?;
        temp_file.as_file().sync_all()?;
        let size = temp_file.as_file().metadata()?.len();

        temp_file.persist(&path).map_err(|e| e.error)?;
        Ok(size)
    })
    .await
}

/// Read and decompress a blob
///
/// # Errors
/// `NotFound` when the file is missing, `Corrupt` when it is not valid gzip.
pub async fn read_blob(
    checkpoint_id: String,
    path: PathBuf,
    op_timeout: Duration,
) -> Result<Vec<u8>, CheckpointError> {
    let description = path.display().to_string();
    run_blocking(op_timeout, description, move || {
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::corrupt(
                    &checkpoint_id,
                    "metadata present but payload file is missing",
                ));
            }
            Err(e) => return Err(e.into()),
        };
        let mut decoder = GzDecoder::new(file);
        let mut payload = Vec::new();
        decoder
            .read_to_end(&mut payload)
            .map_err(|e| CheckpointError::corrupt(&checkpoint_id, format!("decompression failed: {e}")))?;
        Ok(payload)
    })
    .await
}

pub async fn write_metadata(
    path: PathBuf,
    metadata: CheckpointMetadata,
    op_timeout: Duration,
) -> Result<(), CheckpointError> {
    let description = path.display().to_string();
    run_blocking(op_timeout, description, move || {
        write_json_atomic(&path, &metadata)?;
        Ok(())
    })
    .await
}

/// Load every `*_meta.json` below `storage_dir`
///
/// Unreadable metadata files are skipped with a warning.
pub fn scan_metadata(storage_dir: &Path) -> std::io::Result<Vec<CheckpointMetadata>> {
    let mut found = Vec::new();
    for crawl_dir in std::fs::read_dir(storage_dir)? {
        let crawl_dir = crawl_dir?.path();
        if !crawl_dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&crawl_dir)? {
            let path = entry?.path();
            let is_metadata = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with("_meta.json"));
            if !is_metadata {
                continue;
            }
            match read_json::<CheckpointMetadata>(&path) {
                Ok(metadata) => found.push(metadata),
                Err(e) => log::warn!("Skipping unreadable checkpoint metadata {}: {e}", path.display()),
            }
        }
    }
    Ok(found)
}

/// Remove a file, treating "already gone" as success
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
