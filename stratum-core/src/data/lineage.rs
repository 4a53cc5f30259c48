//! Run lineage records.
//!
//! One JSON document per written version, stored next to the versions as
//! `run_<version_id>.json` so it can be found from the id alone.

use crate::error::PipelineError;
use crate::persistence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a run read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageInput {
    pub path: String,
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageOutput {
    pub dataset_root: String,
    pub version: String,
}

/// Full lineage record for one dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub env: String,
    pub input: LineageInput,
    pub output: LineageOutput,
    /// Build that produced the version; serialized as `null` when unknown.
    pub git_sha: Option<String>,
    pub features: BTreeMap<String, bool>,
    pub row_counts: BTreeMap<String, u64>,
    pub created_at_utc: DateTime<Utc>,
}

/// Writes lineage records into one output root.
#[derive(Debug, Clone)]
pub struct LineageRecorder {
    output_root: PathBuf,
}

impl LineageRecorder {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Location of the record for `version_id`.
    pub fn record_path(&self, version_id: &str) -> PathBuf {
        self.output_root.join(format!("run_{version_id}.json"))
    }

    /// Write the record for `version_id`, replacing any earlier one.
    ///
    /// The version itself is not checked for existence.
    pub fn record(
        &self,
        env: &str,
        input_path: &str,
        version_id: &str,
        source_revision: Option<&str>,
        features: &BTreeMap<String, bool>,
        row_counts: &BTreeMap<String, u64>,
    ) -> Result<(), PipelineError> {
        validate_version_id(version_id)?;

        let record = LineageRecord {
            env: env.to_string(),
            input: LineageInput {
                path: input_path.to_string(),
            },
            output: LineageOutput {
                dataset_root: self.output_root.display().to_string(),
                version: version_id.to_string(),
            },
            git_sha: source_revision.map(str::to_string),
            features: features.clone(),
            row_counts: row_counts.clone(),
            created_at_utc: Utc::now(),
        };

        let path = self.record_path(version_id);
        persistence::atomic_write_json(&path, &record)?;
        tracing::info!(
            version = %version_id,
            path = %path.display(),
            "Recorded lineage"
        );
        Ok(())
    }

    /// Load the record for `version_id`, if one was written.
    pub fn load(&self, version_id: &str) -> Result<Option<LineageRecord>, PipelineError> {
        validate_version_id(version_id)?;
        persistence::load_json(&self.record_path(version_id))
    }
}

fn validate_version_id(version_id: &str) -> Result<(), PipelineError> {
    if version_id.is_empty()
        || version_id.contains(['/', '\\'])
        || version_id == "."
        || version_id == ".."
    {
        return Err(PipelineError::invalid_input(format!(
            "invalid version id: {version_id:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn flags() -> BTreeMap<String, bool> {
        BTreeMap::from([("feature1".to_string(), true), ("feature2".to_string(), false)])
    }

    fn counts(a: u64, b: u64) -> BTreeMap<String, u64> {
        BTreeMap::from([("table1".to_string(), a), ("table2".to_string(), b)])
    }

    #[test]
    fn test_record_writes_every_field() {
        let dir = TempDir::new().unwrap();
        let output_root = dir.path().join("output");
        std::fs::create_dir(&output_root).unwrap();
        let recorder = LineageRecorder::new(&output_root);

        recorder
            .record("dev", "/fake/input/path", "v1", Some("123abc"), &flags(), &counts(10, 5))
            .unwrap();

        let path = output_root.join("run_v1.json");
        assert!(path.exists());
        let data: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(data["env"], "dev");
        assert_eq!(data["input"]["path"], "/fake/input/path");
        assert_eq!(
            data["output"]["dataset_root"],
            output_root.display().to_string()
        );
        assert_eq!(data["output"]["version"], "v1");
        assert_eq!(data["git_sha"], "123abc");
        assert_eq!(
            data["features"],
            serde_json::json!({"feature1": true, "feature2": false})
        );
        assert_eq!(
            data["row_counts"],
            serde_json::json!({"table1": 10, "table2": 5})
        );
        let created = data["created_at_utc"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(created).is_ok());
    }

    #[test]
    fn test_missing_revision_is_null() {
        let dir = TempDir::new().unwrap();
        let recorder = LineageRecorder::new(dir.path());
        recorder
            .record("prod", "in.csv", "v2", None, &flags(), &counts(1, 1))
            .unwrap();

        let data: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(recorder.record_path("v2")).unwrap())
                .unwrap();
        assert!(data.get("git_sha").is_some_and(|v| v.is_null()));
    }

    #[test]
    fn test_rerecord_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let recorder = LineageRecorder::new(dir.path());

        recorder
            .record("dev", "in.csv", "v1", None, &flags(), &counts(10, 5))
            .unwrap();
        recorder
            .record("dev", "in.csv", "v1", None, &flags(), &counts(7, 3))
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["run_v1.json".to_string()]);

        let record = recorder.load("v1").unwrap().unwrap();
        assert_eq!(record.row_counts, counts(7, 3));
    }

    #[test]
    fn test_load_roundtrips_record() {
        let dir = TempDir::new().unwrap();
        let recorder = LineageRecorder::new(dir.path());
        recorder
            .record(
                "staging",
                "s3-mirror/in.csv",
                "20260101_120000",
                Some("deadbeef"),
                &flags(),
                &counts(3, 2),
            )
            .unwrap();

        let record = recorder.load("20260101_120000").unwrap().unwrap();
        assert_eq!(record.env, "staging");
        assert_eq!(record.input.path, "s3-mirror/in.csv");
        assert_eq!(record.output.version, "20260101_120000");
        assert_eq!(record.git_sha.as_deref(), Some("deadbeef"));
        assert_eq!(record.features, flags());
        assert!(recorder.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_record_creates_output_root() {
        let dir = TempDir::new().unwrap();
        let recorder = LineageRecorder::new(dir.path().join("nested").join("root"));
        recorder
            .record("dev", "in.csv", "v1", None, &flags(), &counts(0, 0))
            .unwrap();
        assert!(recorder.record_path("v1").exists());
    }

    #[test]
    fn test_rejects_path_like_version_id() {
        let dir = TempDir::new().unwrap();
        let recorder = LineageRecorder::new(dir.path());
        let err = recorder
            .record("dev", "in.csv", "../escape", None, &flags(), &counts(0, 0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
