use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording::Recording;

/// Sidecar path for a recording file: `{file}.metadata.json` (extension replaced).
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write a recording as a pretty-printed JSON sidecar next to its audio file.
pub fn write_metadata(recording: &Recording) -> Result<PathBuf, CaptureError> {
    let path = metadata_path(&recording.file);
    let json = serde_json::to_string_pretty(recording)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json).map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read the JSON sidecar of a recording file.
pub fn read_metadata(recording_path: &Path) -> Result<Recording, CaptureError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}
