//! Build orchestration entry point
//!
//! Ties the pipeline together: manifest loading, target resolution,
//! graph construction, and parallel execution. Process execution and
//! source enumeration are injected so tests can run the whole pipeline
//! against a fake toolchain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::graph::TargetGraph;
use crate::manifest::Manifest;
use crate::resolve::{resolve_targets, ResolvedTarget};
use crate::source::{enumerate_headers, enumerate_units, FsEnumerator, SourceEnumerator};
use crate::staleness;
use crate::Result;

use super::parallel::{ParallelExecutor, TargetOutcome, TargetReport};
use super::progress::BuildProgress;
use super::runner::{CommandRunner, ProcessRunner};

/// Arguments for a build run
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    /// Targets to build; empty means every target in the manifest
    pub targets: Vec<String>,
    /// Parallel job override (falls back to the configured value)
    pub jobs: Option<usize>,
    /// Report what would be done without running any process
    pub dry_run: bool,
    /// Rebuild everything regardless of cache state
    pub force_rebuild: bool,
}

/// Outcome of a build run
#[derive(Debug)]
pub struct BuildResult {
    /// Per-target reports in build order
    pub reports: Vec<TargetReport>,
}

impl BuildResult {
    /// True when every target was built or already up to date
    pub fn success(&self) -> bool {
        self.reports.iter().all(|r| {
            matches!(
                r.outcome,
                TargetOutcome::Done { .. } | TargetOutcome::UpToDate
            )
        })
    }
}

/// Orchestrates builds for one workspace
pub struct Builder {
    root: Utf8PathBuf,
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    enumerator: Arc<dyn SourceEnumerator>,
    abort: Arc<AtomicBool>,
}

impl Builder {
    /// Create a builder for the workspace rooted at `root`
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config) -> Self {
        let root = root.into();
        let abort = Arc::new(AtomicBool::new(false));
        Self {
            runner: Arc::new(CommandRunner::new(abort.clone())),
            enumerator: Arc::new(FsEnumerator::new(root.clone())),
            root,
            config,
            abort,
        }
    }

    /// Substitute the process runner (used by tests)
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Substitute the source enumerator (used by tests)
    pub fn with_enumerator(mut self, enumerator: Arc<dyn SourceEnumerator>) -> Self {
        self.enumerator = enumerator;
        self
    }

    /// Flag that aborts the run when set (e.g. from a signal handler)
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Run a build according to `args`
    pub fn build(&self, args: &BuildArgs) -> Result<BuildResult> {
        let manifest_path = self.root.join(&self.config.workspace.manifest);
        let manifest = Manifest::from_path(&manifest_path)?;
        let resolved = resolve_targets(&manifest)?;

        let graph = TargetGraph::build(&resolved)?;
        let order = graph.restrict_to(&args.targets)?;
        let targets: HashMap<String, ResolvedTarget> =
            resolved.into_iter().map(|t| (t.name.clone(), t)).collect();

        tracing::info!(
            "Building {} target(s) from {}",
            order.len(),
            manifest_path
        );

        if args.dry_run {
            let reports = self.plan(&order, &targets, &graph, &manifest, args.force_rebuild)?;
            summarize(&reports, true);
            return Ok(BuildResult { reports });
        }

        let cache = CacheManager::load(&self.root.join(&self.config.workspace.state_dir))?;
        let jobs = args.jobs.unwrap_or_else(|| self.config.effective_jobs());
        let progress = BuildProgress::new(order.len());

        let executor = ParallelExecutor::new(
            self.root.clone(),
            self.config.workspace.build_dir.clone(),
            manifest.source_extension.clone(),
            manifest.header_extension.clone(),
            self.config.toolchain(),
            cache,
            self.runner.clone(),
            self.enumerator.clone(),
            jobs,
            args.force_rebuild,
            self.config.build.stop_on_failure,
            self.abort.clone(),
        );

        let reports = executor.execute(&order, &targets, &graph, &progress)?;
        summarize(&reports, false);
        Ok(BuildResult { reports })
    }

    /// Dry run: sequential staleness analysis, zero process invocations
    fn plan(
        &self,
        order: &[String],
        targets: &HashMap<String, ResolvedTarget>,
        graph: &TargetGraph,
        manifest: &Manifest,
        force: bool,
    ) -> Result<Vec<TargetReport>> {
        let cache = CacheManager::load(&self.root.join(&self.config.workspace.state_dir))?;
        let snapshot = cache.snapshot();

        let mut reports = Vec::with_capacity(order.len());
        let mut would_rebuild: HashSet<&str> = HashSet::new();
        let mut failed: HashMap<&str, String> = HashMap::new();

        for name in order {
            if let Some(cause) = graph
                .dependencies_of(name)
                .iter()
                .find_map(|dep| failed.get(dep.as_str()).cloned())
            {
                reports.push(TargetReport {
                    name: name.clone(),
                    outcome: TargetOutcome::Skipped {
                        reason: format!("dependency '{}' failed", cause),
                    },
                });
                failed.insert(name.as_str(), cause);
                continue;
            }

            let target = &targets[name];
            let deps_rebuilt = graph
                .dependencies_of(name)
                .iter()
                .any(|dep| would_rebuild.contains(dep.as_str()));
            let analysis = enumerate_units(
                target,
                &manifest.source_extension,
                &self.config.workspace.build_dir,
                self.enumerator.as_ref(),
            )
            .and_then(|units| {
                let headers =
                    enumerate_headers(target, &manifest.header_extension, self.enumerator.as_ref())?;
                staleness::analyze(
                    &self.root,
                    target,
                    &units,
                    &headers,
                    &manifest.source_extension,
                    &snapshot,
                    deps_rebuilt,
                    force,
                )
            });

            match analysis {
                Ok(report) if report.stale_units.is_empty() && !report.needs_relink => {
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::UpToDate,
                    });
                }
                Ok(report) => {
                    would_rebuild.insert(name.as_str());
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::Done {
                            compiled_units: report.stale_units.len(),
                        },
                    });
                }
                Err(e) => {
                    failed.insert(name.as_str(), name.clone());
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(reports)
    }
}

/// Log one line per target, failures last
fn summarize(reports: &[TargetReport], dry_run: bool) {
    let verb = if dry_run { "Would build" } else { "Built" };

    for report in reports {
        match &report.outcome {
            TargetOutcome::Done { compiled_units } => {
                tracing::info!("{} {} ({} units compiled)", verb, report.name, compiled_units);
            }
            TargetOutcome::UpToDate => {
                tracing::info!("{} is up to date", report.name);
            }
            TargetOutcome::Skipped { reason } => {
                tracing::warn!("Skipped {}: {}", report.name, reason);
            }
            TargetOutcome::Failed { .. } => {}
        }
    }

    for report in reports {
        if let TargetOutcome::Failed { error } = &report.outcome {
            tracing::error!("Failed {}: {}", report.name, error);
        }
    }
}
