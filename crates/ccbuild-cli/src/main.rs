//! ccbuild CLI - manifest-driven incremental C/C++ builds

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// ccbuild - manifest-driven incremental build orchestrator
#[derive(Debug, Parser)]
#[command(name = "ccbuild")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workspace root directory
    #[arg(short = 'w', long, global = true)]
    workspace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build targets declared in the manifest
    Build(commands::build::BuildArgs),
}

fn main() -> Result<()> {
    // Initialize tracing with indicatif layer for progress bar support
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .with(filter)
        .init();

    let cli = Cli::parse();

    // Determine workspace root
    let workspace_root = if let Some(ref path) = cli.workspace {
        camino::Utf8PathBuf::from(path)
    } else {
        std::env::current_dir()
            .ok()
            .and_then(|p| camino::Utf8PathBuf::try_from(p).ok())
            .unwrap_or_else(|| camino::Utf8PathBuf::from("."))
    };

    match cli.command {
        Commands::Build(args) => commands::build::run(&workspace_root, args),
    }
}
