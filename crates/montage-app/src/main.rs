//! Montage CLI - drive the timeline and media pipeline from a shell.
//!
//! Usage:
//!   montage probe <PATH>          Print media metadata
//!   montage import <PATH>...      Probe sources and build their proxies
//!   montage plan <PROJECT>        Show the export plan of a project file
//!   montage export <PROJECT>      Render a project file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use montage_pipeline::MontageConfig;

mod commands;
mod logging;
mod session;

#[derive(Parser)]
#[command(
    name = "montage",
    about = "Timeline and media pipeline engine",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $MONTAGE_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Explicit ffmpeg binary
    #[arg(long, global = true, env = "MONTAGE_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// Explicit ffprobe binary
    #[arg(long, global = true, env = "MONTAGE_FFPROBE")]
    ffprobe: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a media file and print its metadata
    Probe {
        /// Media file
        path: PathBuf,
    },

    /// Register media files, probe them and generate proxies
    Import {
        /// Media files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Stop after probing
        #[arg(long)]
        no_proxy: bool,
    },

    /// Plan an export without rendering it
    Plan(commands::ExportArgs),

    /// Render a project file
    Export(commands::ExportArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MontageConfig::load_from(path)?,
        None => MontageConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.ffmpeg.is_some() {
        config.engine.ffmpeg_path = cli.ffmpeg;
    }
    if cli.ffprobe.is_some() {
        config.engine.ffprobe_path = cli.ffprobe;
    }
    logging::init_logging(&config.logging);

    match cli.command {
        Commands::Probe { path } => commands::probe::run(&config, path).await,
        Commands::Import { paths, no_proxy } => {
            commands::import::run(config, paths, !no_proxy).await
        }
        Commands::Plan(args) => commands::plan::run(config, args).await,
        Commands::Export(args) => commands::export::run(config, args).await,
    }
}
