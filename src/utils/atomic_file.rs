//! Temp-file-then-rename writes
//!
//! Every durable artifact (checkpoint metadata, iteration metadata,
//! fingerprint maps) goes through here so a crash mid-write leaves either the
//! previous file or the new one, never a torn file.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

/// Atomically replace `path` with `bytes`
///
/// The temp file is created in the target's own directory so the final
/// `persist` is a same-filesystem rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent_dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Path has no parent directory: {}", path.display()),
        )
    })?;
    std::fs::create_dir_all(parent_dir)?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and atomically write it to `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
    write_atomic(path, &json)
}

/// Read and deserialize a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> std::io::Result<T> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("value.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();

        let value: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(value, vec![4]);
    }

    #[test]
    fn read_json_reports_invalid_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = read_json::<serde_json::Value>(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
