//! Subcommand handlers.

use crate::{Commands, DatasetTarget};
use anyhow::Context;
use std::path::{Path, PathBuf};
use stratum_core::config::{ENV_VAR, config_path_for};
use stratum_core::data::generate::{generate_sales, write_sales_csv};
use stratum_core::data::storage::{list_versions, read_latest};
use stratum_core::{AppConfig, AppEnv, LineageRecorder, RunOptions, load_config, run_pipeline};

/// Environment variable carrying the build's source revision.
const GIT_SHA_VAR: &str = "GIT_SHA";

pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Run { smoke, config } => {
            let cfg = resolve_config(workspace, config.as_deref())?;
            let opts = RunOptions {
                smoke,
                source_revision: source_revision(std::env::var(GIT_SHA_VAR).ok()),
            };
            let report = run_pipeline(&cfg, &opts)
                .with_context(|| format!("Pipeline run failed for env '{}'", cfg.env))?;

            println!("Run complete ({})", cfg.env);
            println!("  Version:  {}", report.descriptor.version_id);
            println!("  Output:   {}", report.descriptor.storage_path.display());
            println!("  Rows:     {} in, {} out", report.input_rows, report.output_rows);
            println!("  Hash:     {}", report.descriptor.content_hash);
            println!("  Lineage:  {}", report.lineage_path.display());
            Ok(())
        }
        Commands::Generate { rows, seed, output } => {
            let path = workspace.join(output);
            let table = generate_sales(rows, seed);
            write_sales_csv(&table, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} rows to {}", table.row_count(), path.display());
            Ok(())
        }
        Commands::Latest { target } => {
            let root = resolve_root(workspace, &target)?;
            let Some(latest) = read_latest(&root)? else {
                println!("No version promoted under {}", root.display());
                return Ok(());
            };
            println!("Latest: {}", latest.display());

            let version_id = latest
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .context("LATEST pointer does not name a version directory")?;
            match LineageRecorder::new(&root).load(&version_id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No lineage record for version {version_id}"),
            }
            Ok(())
        }
        Commands::Versions { target } => {
            let root = resolve_root(workspace, &target)?;
            let versions = list_versions(&root)?;
            if versions.is_empty() {
                println!("No versions under {}", root.display());
                return Ok(());
            }
            let current = read_latest(&root)?;
            println!("Versions under {}:", root.display());
            for id in versions {
                let promoted = current
                    .as_deref()
                    .and_then(Path::parent)
                    .and_then(Path::file_name)
                    .is_some_and(|n| n == id.as_str());
                let marker = if promoted { "*" } else { " " };
                println!("  {marker} {id}");
            }
            Ok(())
        }
    }
}

/// Load the explicit config file, or `config/<APP_ENV>.yaml` under the workspace.
///
/// Relative paths inside the config resolve against the workspace.
fn resolve_config(workspace: &Path, explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = match explicit {
        Some(path) => workspace.join(path),
        None => {
            let env = AppEnv::from_var(std::env::var(ENV_VAR).ok().as_deref())?;
            config_path_for(workspace, env)
        }
    };
    tracing::debug!(path = %path.display(), "Resolved config file");
    let cfg = load_config(&path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    Ok(cfg.rebase(workspace))
}

fn resolve_root(workspace: &Path, target: &DatasetTarget) -> anyhow::Result<PathBuf> {
    match &target.root {
        Some(root) => Ok(workspace.join(root)),
        None => Ok(resolve_config(workspace, target.config.as_deref())?.dataset_root()),
    }
}

/// Blank revisions are recorded as absent.
fn source_revision(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
