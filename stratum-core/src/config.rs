//! Configuration system for Stratum.
//!
//! Uses `figment` for layered configuration: YAML file -> environment. The file
//! is `config/<env>.yaml` in the workspace unless a path is given explicitly;
//! environment variables prefixed with `STRATUM_` override individual keys
//! (`STRATUM_RUN__WRITE_FORMAT=csv`, `STRATUM_FEATURES__ENABLE_NEW_METRIC=true`).

use crate::error::PipelineError;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable that selects which config file to load.
pub const ENV_VAR: &str = "APP_ENV";

/// Deployment environment a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Dev => "dev",
            AppEnv::Staging => "staging",
            AppEnv::Prod => "prod",
        }
    }

    /// Resolve from the raw value of [`ENV_VAR`], defaulting to `dev` when unset.
    pub fn from_var(value: Option<&str>) -> Result<Self, PipelineError> {
        match value {
            None => Ok(AppEnv::Dev),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for AppEnv {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(AppEnv::Dev),
            "staging" => Ok(AppEnv::Staging),
            "prod" => Ok(AppEnv::Prod),
            other => Err(PipelineError::config(format!("Invalid {ENV_VAR}: {other}"))),
        }
    }
}

impl std::fmt::Display for AppEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: AppEnv,
    pub paths: PathsConfig,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Medallion-style storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub base: String,
    pub bronze: String,
    pub silver: String,
    pub gold: String,
}

/// The dataset this pipeline produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Directory name under the silver layer.
    pub name: String,
    /// CSV file to extract from.
    pub input_path: String,
}

/// Feature flags that shape the transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Derive the `amount_bucket` column.
    #[serde(default)]
    pub enable_new_metric: bool,
    /// Drop rows whose `amount` is negative.
    #[serde(default = "default_true")]
    pub drop_negative_amounts: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            enable_new_metric: false,
            drop_negative_amounts: true,
        }
    }
}

impl FeaturesConfig {
    /// Flag name -> value, as recorded in lineage.
    pub fn flags(&self) -> BTreeMap<String, bool> {
        BTreeMap::from([
            ("enable_new_metric".to_string(), self.enable_new_metric),
            ("drop_negative_amounts".to_string(), self.drop_negative_amounts),
        ])
    }
}

/// Run-time knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Serialization format name, resolved by the writer (`parquet` or `csv`).
    #[serde(default = "default_write_format")]
    pub write_format: String,
    /// Row cap applied in smoke mode.
    #[serde(default = "default_max_rows_smoke")]
    pub max_rows_smoke: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            write_format: default_write_format(),
            max_rows_smoke: default_max_rows_smoke(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_write_format() -> String {
    "parquet".to_string()
}

fn default_max_rows_smoke() -> usize {
    200
}

impl AppConfig {
    /// Root under which versions of this dataset are written.
    pub fn dataset_root(&self) -> PathBuf {
        Path::new(&self.paths.silver).join(&self.dataset.name)
    }

    /// Resolve relative storage and input paths against `base`.
    pub fn rebase(mut self, base: &Path) -> Self {
        let paths = [
            &mut self.paths.base,
            &mut self.paths.bronze,
            &mut self.paths.silver,
            &mut self.paths.gold,
            &mut self.dataset.input_path,
        ];
        for path in paths {
            if Path::new(path.as_str()).is_relative() {
                *path = base.join(path.as_str()).display().to_string();
            }
        }
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let name = self.dataset.name.trim();
        if name.is_empty() {
            return Err(PipelineError::config("dataset.name must not be empty"));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(PipelineError::config(format!(
                "dataset.name must be a single path component: {name}"
            )));
        }
        if self.dataset.input_path.trim().is_empty() {
            return Err(PipelineError::config("dataset.input_path must not be empty"));
        }
        Ok(())
    }
}

/// Default config file for an environment: `<workspace>/config/<env>.yaml`.
pub fn config_path_for(workspace: &Path, env: AppEnv) -> PathBuf {
    workspace.join("config").join(format!("{env}.yaml"))
}

/// Load configuration from a YAML file, then `STRATUM_*` environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let config: AppConfig = Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed("STRATUM_").split("__"))
        .extract()
        .map_err(Box::new)?;
    config.validate()?;

    tracing::debug!(
        path = %path.display(),
        env = %config.env,
        dataset = %config.dataset.name,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEV_YAML: &str = r#"
env: dev
paths:
  base: ./data/dev
  bronze: ./data/dev/bronze
  silver: ./data/dev/silver
  gold: ./data/dev/gold
dataset:
  name: sales
  input_path: ./data/dev/input/sales.csv
"#;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("dev.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_config_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(&write_config(&dir, DEV_YAML)).unwrap();
        assert_eq!(cfg.env, AppEnv::Dev);
        assert_eq!(cfg.run.write_format, "parquet");
        assert_eq!(cfg.run.max_rows_smoke, 200);
        assert!(cfg.features.drop_negative_amounts);
        assert!(!cfg.features.enable_new_metric);
        assert_eq!(cfg.dataset_root(), PathBuf::from("./data/dev/silver/sales"));
    }

    #[test]
    fn test_load_config_explicit_sections() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{DEV_YAML}features:\n  enable_new_metric: true\n  drop_negative_amounts: false\n\
             run:\n  write_format: csv\n  max_rows_smoke: 5\n"
        );
        let cfg = load_config(&write_config(&dir, &body)).unwrap();
        assert!(cfg.features.enable_new_metric);
        assert!(!cfg.features.drop_negative_amounts);
        assert_eq!(cfg.run.write_format, "csv");
        assert_eq!(cfg.run.max_rows_smoke, 5);
    }

    #[test]
    fn test_rebase_resolves_relative_paths_only() {
        let dir = TempDir::new().unwrap();
        let body = DEV_YAML.replace("gold: ./data/dev/gold", "gold: /srv/gold");
        let cfg = load_config(&write_config(&dir, &body))
            .unwrap()
            .rebase(Path::new("/work"));
        assert_eq!(cfg.paths.silver, "/work/./data/dev/silver");
        assert_eq!(cfg.paths.gold, "/srv/gold");
        assert_eq!(cfg.dataset.input_path, "/work/./data/dev/input/sales.csv");
        assert_eq!(
            cfg.dataset_root(),
            Path::new("/work/./data/dev/silver").join("sales")
        );
    }

    #[test]
    fn test_load_config_rejects_unknown_env() {
        let dir = TempDir::new().unwrap();
        let body = DEV_YAML.replace("env: dev", "env: qa");
        assert!(matches!(
            load_config(&write_config(&dir, &body)),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/config/dev.yaml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_load_config_rejects_nested_dataset_name() {
        let dir = TempDir::new().unwrap();
        let body = DEV_YAML.replace("name: sales", "name: ../sales");
        assert!(load_config(&write_config(&dir, &body)).is_err());
    }

    #[test]
    fn test_app_env_from_var() {
        assert_eq!(AppEnv::from_var(None).unwrap(), AppEnv::Dev);
        assert_eq!(AppEnv::from_var(Some("prod")).unwrap(), AppEnv::Prod);
        assert_eq!(AppEnv::from_var(Some("Staging")).unwrap(), AppEnv::Staging);
        assert!(AppEnv::from_var(Some("test")).is_err());
    }

    #[test]
    fn test_config_path_for() {
        let path = config_path_for(Path::new("/work"), AppEnv::Prod);
        assert_eq!(path, PathBuf::from("/work/config/prod.yaml"));
    }

    #[test]
    fn test_feature_flags_map() {
        let flags = FeaturesConfig::default().flags();
        assert_eq!(flags.len(), 2);
        assert!(flags["drop_negative_amounts"]);
        assert!(!flags["enable_new_metric"]);
    }
}
