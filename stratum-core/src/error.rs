//! Error types for the stratum-core crate.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported write format: {0}")]
    UnsupportedFormat(String),

    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Version {version_id} already exists under {}", root.display())]
    VersionCollision { version_id: String, root: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extract error: {0}")]
    Extract(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn storage(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn extract(msg: impl Into<String>) -> Self {
        Self::Extract(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<Box<figment::Error>> for PipelineError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::Config(err.to_string())
    }
}
