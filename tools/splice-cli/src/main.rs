//! Splice CLI: command-line interface for planning and simulating compositions.
//!
//! Usage:
//!   splice check               Show which codecs the in-process engine can encode
//!   splice plan <JOB>          Resolve output format and per-clip paths for a job
//!   splice simulate [JOB]      Run a job through the in-process engine

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use splice_common::config::SpliceConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "splice",
    about = "Client-side timeline composition engine",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/splice/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which codecs the in-process engine can encode per container
    Check {
        /// Probe width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Probe height
        #[arg(long, default_value = "1080")]
        height: u32,
    },

    /// Validate a job file and print the resolved plan as JSON
    Plan {
        /// Path to the job description
        path: PathBuf,
    },

    /// Compose a job with the in-process engine and print the report
    Simulate {
        /// Path to the job description (built-in demo when omitted)
        path: Option<PathBuf>,

        /// Restrict the engine to these video encoders (comma separated)
        #[arg(long, value_delimiter = ',')]
        video_encoders: Vec<String>,

        /// Restrict the engine to these audio encoders (comma separated)
        #[arg(long, value_delimiter = ',')]
        audio_encoders: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SpliceConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => SpliceConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    splice_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Check { width, height } => commands::check::run(width, height).await,
        Commands::Plan { path } => commands::plan::run(&config, path),
        Commands::Simulate {
            path,
            video_encoders,
            audio_encoders,
        } => commands::simulate::run(&config, path, video_encoders, audio_encoders).await,
    }
}
