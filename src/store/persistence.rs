//! Whole-document persistence.
//!
//! Documents are serialized to a temporary file next to their destination and
//! renamed over it, so readers only ever see the previous or the new version.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Prefix of the temporary files created by atomic writes.
pub const TEMP_PREFIX: &str = ".dedupfs-tmp";

/// Write `bytes` to `path` through a sibling temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = path.parent().ok_or_else(|| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })?;
    let mut temp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    persist(temp, path)
}

/// Rename a finished temporary file onto `path`.
pub(crate) fn persist(temp: NamedTempFile, path: &Path) -> Result<(), StorageError> {
    temp.persist(path).map_err(|e| StorageError::IoError(e.error))?;
    Ok(())
}

/// Serialize `value` as JSON and write it atomically.
pub fn save_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), StorageError> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .map_err(|e| {
        StorageError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    write_atomic(path, &bytes)
}

/// Read and parse a JSON document. Parse failures are `CorruptState`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::corrupt(path, e))
}
