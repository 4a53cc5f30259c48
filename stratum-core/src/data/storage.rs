//! Versioned dataset storage.
//!
//! A dataset root holds one immutable directory per version plus a single
//! mutable `LATEST` pointer:
//!
//! ```text
//! <root>/
//!   LATEST                  path of the current version's data file
//!   20260101_120000/
//!     data.parquet
//! ```
//!
//! A write persists the data file completely (temp file, fsync, rename) before
//! the pointer is replaced, so the pointer only ever names complete files.
//! Version directories are created exclusively and never rewritten: two writes
//! in the same second fail the second one with
//! [`PipelineError::VersionCollision`] instead of clobbering the first.

use crate::data::format::{WriteFormat, read_table};
use crate::data::table::Table;
use crate::error::PipelineError;
use crate::persistence;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the pointer file at the dataset root.
pub const LATEST_POINTER: &str = "LATEST";

/// `strftime` layout of version ids; fixed width, so lexical order is
/// chronological order.
pub const VERSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Source of wall-clock time for version ids.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The durable outcome of one write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub version_id: String,
    pub storage_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    pub written_at: DateTime<Utc>,
    pub format: WriteFormat,
    pub row_count: usize,
    /// SHA-256 of the data file.
    pub content_hash: String,
}

/// Writes immutable versions of a table under one dataset root.
#[derive(Clone)]
pub struct VersionedWriter {
    dataset_root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for VersionedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedWriter")
            .field("dataset_root", &self.dataset_root)
            .finish_non_exhaustive()
    }
}

impl VersionedWriter {
    pub fn new(dataset_root: impl Into<PathBuf>) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }

    pub fn latest_pointer_path(&self) -> PathBuf {
        self.dataset_root.join(LATEST_POINTER)
    }

    /// Resolve `format` by name, then [`write`](Self::write).
    ///
    /// An unknown name fails before anything under the root is touched.
    pub fn write_named(
        &self,
        table: &Table,
        format: &str,
        source_revision: Option<&str>,
    ) -> Result<VersionDescriptor, PipelineError> {
        let format: WriteFormat = format.parse()?;
        self.write(table, format, source_revision)
    }

    /// Persist `table` as a new version and promote it to `LATEST`.
    pub fn write(
        &self,
        table: &Table,
        format: WriteFormat,
        source_revision: Option<&str>,
    ) -> Result<VersionDescriptor, PipelineError> {
        table.validate()?;

        let root = &self.dataset_root;
        std::fs::create_dir_all(root).map_err(|e| PipelineError::storage(root, e))?;

        let version_id = version_id_at(self.clock.now());
        let version_dir = root.join(&version_id);
        match std::fs::create_dir(&version_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::VersionCollision {
                    version_id,
                    root: root.clone(),
                });
            }
            Err(e) => return Err(PipelineError::storage(&version_dir, e)),
        }

        let storage_path = version_dir.join(format.file_name());
        let written =
            persistence::atomic_write_with(&storage_path, |file| format.encode(table, file));
        if let Err(e) = written {
            // Nothing was promoted; the directory is still empty.
            let _ = std::fs::remove_dir(&version_dir);
            return Err(e);
        }
        let content_hash = hash_file(&storage_path)?;

        persistence::atomic_write(
            &self.latest_pointer_path(),
            storage_path.to_string_lossy().as_bytes(),
        )?;

        let descriptor = VersionDescriptor {
            version_id,
            storage_path,
            source_revision: source_revision.map(str::to_string),
            written_at: Utc::now(),
            format,
            row_count: table.row_count(),
            content_hash,
        };
        tracing::info!(
            version = %descriptor.version_id,
            path = %descriptor.storage_path.display(),
            rows = descriptor.row_count,
            format = %descriptor.format,
            "Wrote dataset version"
        );
        Ok(descriptor)
    }
}

/// Version id for a point in time.
pub fn version_id_at(ts: DateTime<Utc>) -> String {
    ts.format(VERSION_ID_FORMAT).to_string()
}

/// Whether `name` is a well-formed version id.
pub fn is_version_id(name: &str) -> bool {
    name.len() == 15 && NaiveDateTime::parse_from_str(name, VERSION_ID_FORMAT).is_ok()
}

/// Data file the root's `LATEST` pointer names, if any version was promoted.
pub fn read_latest(dataset_root: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let pointer = dataset_root.join(LATEST_POINTER);
    Ok(persistence::read_text(&pointer)?
        .map(|content| content.trim_end().to_string())
        .filter(|content| !content.is_empty())
        .map(PathBuf::from))
}

/// Load the table currently promoted under `dataset_root`.
pub fn read_latest_table(dataset_root: &Path) -> Result<Option<Table>, PipelineError> {
    read_latest(dataset_root)?
        .map(|path| read_table(&path))
        .transpose()
}

/// Version ids present under `dataset_root`, oldest first.
///
/// Orphaned versions (written but never promoted) are included; only
/// `LATEST` says which one is current.
pub fn list_versions(dataset_root: &Path) -> Result<Vec<String>, PipelineError> {
    let entries = match std::fs::read_dir(dataset_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PipelineError::storage(dataset_root, e)),
    };

    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::storage(dataset_root, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_version_id(&name) && entry.path().is_dir() {
            versions.push(name);
        }
    }
    versions.sort();
    Ok(versions)
}

/// Compute SHA-256 hash of file contents.
pub fn hash_file(path: &Path) -> Result<String, PipelineError> {
    let mut file = std::fs::File::open(path).map_err(|e| PipelineError::storage(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| PipelineError::storage(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}
