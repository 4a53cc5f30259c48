//! Shared persistence utilities: atomic file writes, JSON load and save.
//!
//! Every durable file this crate produces (data files, the `LATEST` pointer,
//! lineage records) goes through [`atomic_write_with`]: the content is written
//! to a hidden temp sibling, flushed to disk, then renamed over the target. A
//! reader therefore sees either the previous file or the complete new one.

use crate::error::PipelineError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write JSON data to a file.
///
/// The document is serialized fully in memory before any file is opened, so a
/// serialization failure leaves the filesystem untouched.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(data)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::storage(parent, e))?;
    }
    atomic_write_with(path, |file| {
        file.write_all(data)
            .map_err(|e| PipelineError::storage(path, e))
    })
}

/// Atomically produce a file by streaming into a temp sibling.
///
/// `write` receives the open temp file. On any error the temp file is removed
/// and `path` keeps its previous content (or stays absent).
pub fn atomic_write_with<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&mut File) -> Result<(), PipelineError>,
{
    let tmp = tmp_sibling(path);
    if let Err(e) = write_and_sync(&tmp, write) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(PipelineError::storage(path, e));
    }
    sync_parent(path);
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, PipelineError> {
    match read_text(path)? {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

/// Read a UTF-8 file, returning `Ok(None)` if it doesn't exist.
pub fn read_text(path: &Path) -> Result<Option<String>, PipelineError> {
    match std::fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::storage(path, e)),
    }
}

fn write_and_sync<F>(tmp: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&mut File) -> Result<(), PipelineError>,
{
    let mut file = File::create(tmp).map_err(|e| PipelineError::storage(tmp, e))?;
    write(&mut file)?;
    file.sync_all().map_err(|e| PipelineError::storage(tmp, e))
}

/// Hidden, per-process temp name next to `path` so concurrent processes never
/// share a temp file.
fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            tracing::debug!(dir = %parent.display(), error = %e, "Directory fsync failed");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
