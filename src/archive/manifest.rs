//! Completion manifests: the marker that a unit's partitions were all promoted.

use crate::archive::error::ArchiveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

const MANIFEST_DIR: &str = "manifests";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionEntry {
    /// Partition directory name (a year, or `quarantine`).
    pub partition: String,
    /// Path of the committed file relative to the archive root.
    pub file: String,
    pub rows: u64,
}

/// Written after every partition of a unit has been renamed to its final path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub unit: String,
    pub rows: u64,
    pub partitions: Vec<PartitionEntry>,
    pub completed_at: DateTime<Utc>,
}

pub fn manifest_path(root: &Path, unit: &str) -> PathBuf {
    root.join(MANIFEST_DIR).join(format!("{unit}.json"))
}

/// Whether `unit` has a committed archive under `root`.
pub async fn is_complete(root: &Path, unit: &str) -> bool {
    fs::try_exists(manifest_path(root, unit))
        .await
        .unwrap_or(false)
}

pub async fn read_manifest(root: &Path, unit: &str) -> Result<Option<Manifest>, ArchiveError> {
    let path = manifest_path(root, unit);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ArchiveError::ManifestRead(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ArchiveError::ManifestDecode(path, e))
}

/// Writes the manifest through a `.tmp` file and a rename, so it is never seen half-written.
pub(crate) async fn write_manifest(root: &Path, manifest: &Manifest) -> Result<PathBuf, ArchiveError> {
    let path = manifest_path(root, &manifest.unit);
    let dir = root.join(MANIFEST_DIR);
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| ArchiveError::DirCreation(dir.clone(), e))?;

    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| ArchiveError::ManifestEncode(manifest.unit.clone(), e))?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &bytes)
        .await
        .map_err(|e| ArchiveError::ManifestWrite(temp_path.clone(), e))?;
    fs::rename(&temp_path, &path)
        .await
        .map_err(|e| ArchiveError::ManifestWrite(path.clone(), e))?;
    Ok(path)
}
