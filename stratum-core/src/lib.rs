//! # stratum-core: versioned batch dataset pipeline
//!
//! Extracts a CSV, applies the flag-driven sales transform, writes the result
//! as an immutable timestamp-named version under a dataset root, promotes it
//! through the root's `LATEST` pointer and records a JSON lineage document per
//! version.

pub mod config;
pub mod data;
pub mod error;
pub mod persistence;
pub mod pipeline;

pub use config::{AppConfig, AppEnv, load_config};
pub use data::{
    LineageRecord, LineageRecorder, Table, VersionDescriptor, VersionedWriter, WriteFormat,
};
pub use error::PipelineError;
pub use pipeline::{RunOptions, RunReport, run_pipeline, run_pipeline_with};
