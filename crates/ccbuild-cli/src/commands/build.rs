//! Build command implementation

use camino::Utf8Path;
use ccbuild::build::{self, Builder, TargetOutcome};
use ccbuild::config::Config;
use clap::Args;
use miette::{IntoDiagnostic, Result};
use std::sync::atomic::Ordering;

/// Arguments for the build command
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Build specific targets only (plus their dependencies)
    #[arg(short, long)]
    pub targets: Option<Vec<String>>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Dry run - show what would be built
    #[arg(long)]
    pub dry_run: bool,

    /// Rebuild everything regardless of cache state
    #[arg(long)]
    pub force_rebuild: bool,
}

/// Run the build command
pub fn run(workspace_root: &Utf8Path, args: BuildArgs) -> Result<()> {
    let config = Config::load(workspace_root).into_diagnostic()?;
    let builder = Builder::new(workspace_root.to_path_buf(), config);

    // Ctrl-C skips not-yet-started targets and kills in-flight processes
    let abort = builder.abort_flag();
    let _ = ctrlc::set_handler(move || {
        abort.store(true, Ordering::SeqCst);
    });

    let result = builder
        .build(&build::BuildArgs {
            targets: args.targets.unwrap_or_default(),
            jobs: args.jobs,
            dry_run: args.dry_run,
            force_rebuild: args.force_rebuild,
        })
        .into_diagnostic()?;

    for report in &result.reports {
        match &report.outcome {
            TargetOutcome::Done { compiled_units } => {
                println!("  built {} ({} units)", report.name, compiled_units);
            }
            TargetOutcome::UpToDate => {
                println!("  up to date {}", report.name);
            }
            TargetOutcome::Failed { error } => {
                println!("  FAILED {}: {}", report.name, error);
            }
            TargetOutcome::Skipped { reason } => {
                println!("  skipped {} ({})", report.name, reason);
            }
        }
    }

    if !result.success() {
        std::process::exit(1);
    }

    tracing::info!("Build complete!");
    Ok(())
}
