//! Stratum CLI: run the versioned dataset pipeline and inspect its outputs.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Stratum: versioned batch dataset pipeline
#[derive(Parser, Debug)]
#[command(name = "stratum", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (config files and relative outputs resolve here)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Extract, transform and write a new dataset version
    Run {
        /// Cap transformed rows at run.max_rows_smoke
        #[arg(long)]
        smoke: bool,
        /// Configuration file (defaults to config/<APP_ENV>.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a synthetic sales CSV
    Generate {
        /// Number of rows
        #[arg(long, default_value_t = 2000)]
        rows: usize,
        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output path
        #[arg(short, long, default_value = "data/dev/input/sales.csv")]
        output: PathBuf,
    },
    /// Show the promoted version and its lineage record
    Latest {
        #[command(flatten)]
        target: DatasetTarget,
    },
    /// List every version under the dataset root
    Versions {
        #[command(flatten)]
        target: DatasetTarget,
    },
}

/// Which dataset root to inspect.
#[derive(clap::Args, Debug)]
struct DatasetTarget {
    /// Dataset root directory
    #[arg(long, conflicts_with = "config")]
    root: Option<PathBuf>,
    /// Configuration file to derive the root from (defaults to config/<APP_ENV>.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "stratum", "stratum")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "stratum.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace)
}
