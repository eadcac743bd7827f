//! Parallel execution of target builds
//!
//! Schedules targets strictly in dependency order while building
//! independent targets concurrently. Within a target, stale translation
//! units compile under a global semaphore bounding toolchain processes;
//! the link step runs once every unit has resolved. A failed target
//! fails alone: its transitive dependents are skipped with a reason
//! naming it, and unrelated subgraphs keep building.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::cache::CacheManager;
use crate::command::{self, Toolchain};
use crate::graph::TargetGraph;
use crate::resolve::ResolvedTarget;
use crate::source::{enumerate_headers, enumerate_units, SourceEnumerator};
use crate::staleness;
use crate::{Error, Result};

use super::progress::BuildProgress;
use super::runner::ProcessRunner;

/// Terminal state of one target after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Compiled and/or linked successfully
    Done { compiled_units: usize },
    /// Nothing to do; artifact already matches all inputs
    UpToDate,
    /// Compilation or linking failed
    Failed { error: String },
    /// Never attempted (failed dependency or aborted run)
    Skipped { reason: String },
}

/// Per-target result of a build run
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub name: String,
    pub outcome: TargetOutcome,
}

/// Result of one target build task
#[derive(Debug)]
enum TaskResult {
    Built { name: String, compiled_units: usize },
    UpToDate { name: String },
    Failed { name: String, error: String },
}

/// Execute parallel builds for resolved targets
pub struct ParallelExecutor {
    root: Utf8PathBuf,
    build_dir: Utf8PathBuf,
    source_extension: String,
    header_extension: String,
    toolchain: Toolchain,
    cache: Arc<Mutex<CacheManager>>,
    runner: Arc<dyn ProcessRunner>,
    enumerator: Arc<dyn SourceEnumerator>,
    jobs: usize,
    force_rebuild: bool,
    stop_on_failure: bool,
    abort: Arc<AtomicBool>,
}

impl ParallelExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: Utf8PathBuf,
        build_dir: Utf8PathBuf,
        source_extension: String,
        header_extension: String,
        toolchain: Toolchain,
        cache: CacheManager,
        runner: Arc<dyn ProcessRunner>,
        enumerator: Arc<dyn SourceEnumerator>,
        jobs: usize,
        force_rebuild: bool,
        stop_on_failure: bool,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self {
            root,
            build_dir,
            source_extension,
            header_extension,
            toolchain,
            cache: Arc::new(Mutex::new(cache)),
            runner,
            enumerator,
            jobs: jobs.max(1),
            force_rebuild,
            stop_on_failure,
            abort,
        }
    }

    /// Build the given targets (already restricted and in topological order)
    pub fn execute(
        &self,
        order: &[String],
        targets: &HashMap<String, ResolvedTarget>,
        graph: &TargetGraph,
        progress: &BuildProgress,
    ) -> Result<Vec<TargetReport>> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.jobs)
            .enable_all()
            .build()
            .map_err(|e| Error::internal(format!("Failed to create async runtime: {}", e)))?;

        rt.block_on(self.execute_async(order, targets, graph, progress))
    }

    async fn execute_async(
        &self,
        order: &[String],
        targets: &HashMap<String, ResolvedTarget>,
        graph: &TargetGraph,
        progress: &BuildProgress,
    ) -> Result<Vec<TargetReport>> {
        // Kahn bookkeeping over the restricted set
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for name in order {
            in_degree.insert(name.clone(), 0);
        }
        for name in order {
            for dep in graph.dependencies_of(name) {
                if in_degree.contains_key(&dep) {
                    *in_degree.get_mut(name).unwrap() += 1;
                    dependents.entry(dep).or_default().push(name.clone());
                }
            }
        }

        let mut queue: VecDeque<String> = order
            .iter()
            .filter(|name| in_degree[*name] == 0)
            .cloned()
            .collect();

        let ctx = TaskContext {
            root: self.root.clone(),
            build_dir: self.build_dir.clone(),
            source_extension: self.source_extension.clone(),
            header_extension: self.header_extension.clone(),
            toolchain: self.toolchain.clone(),
            cache: self.cache.clone(),
            runner: self.runner.clone(),
            enumerator: self.enumerator.clone(),
            semaphore: Arc::new(Semaphore::new(self.jobs)),
            progress: progress.clone(),
            force_rebuild: self.force_rebuild,
        };

        let (tx, mut rx) = mpsc::channel::<TaskResult>(order.len().max(1));
        let mut reports: Vec<TargetReport> = Vec::with_capacity(order.len());
        // Targets rebuilt or relinked in this run (propagates relink to dependents)
        let mut rebuilt: HashSet<String> = HashSet::new();
        // Dependent -> name of the failed target that blocks it
        let mut blocked: HashMap<String, String> = HashMap::new();
        let mut active_jobs = 0usize;
        let mut remaining = order.len();
        let mut halted = false;

        while remaining > 0 {
            while active_jobs < self.jobs && !queue.is_empty() {
                let name = queue.pop_front().unwrap();

                if let Some(cause) = blocked.get(&name).cloned() {
                    let reason = format!("dependency '{}' failed", cause);
                    tracing::warn!(target_name = %name, %reason, "Skipping");
                    progress.skip_target(&name);
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::Skipped { reason },
                    });
                    remaining -= 1;
                    Self::unlock(&name, &dependents, &mut in_degree, &mut queue, |d| {
                        blocked.entry(d.to_string()).or_insert(cause.clone());
                    });
                    continue;
                }

                if halted || self.abort.load(Ordering::Relaxed) {
                    progress.skip_target(&name);
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::Skipped {
                            reason: "build aborted".to_string(),
                        },
                    });
                    remaining -= 1;
                    Self::unlock(&name, &dependents, &mut in_degree, &mut queue, |_| {});
                    continue;
                }

                let deps_rebuilt = graph
                    .dependencies_of(&name)
                    .iter()
                    .any(|dep| rebuilt.contains(dep));
                let target = targets[&name].clone();
                let task_ctx = ctx.clone();
                let tx = tx.clone();
                active_jobs += 1;

                tokio::spawn(async move {
                    let result = build_target(task_ctx, target, deps_rebuilt).await;
                    let _ = tx.send(result).await;
                });
            }

            if active_jobs == 0 {
                if remaining > 0 && queue.is_empty() {
                    return Err(Error::internal(
                        "Build deadlocked: targets remain but none are ready",
                    ));
                }
                continue;
            }

            let Some(result) = rx.recv().await else { break };
            active_jobs -= 1;
            remaining -= 1;

            match result {
                TaskResult::Built {
                    name,
                    compiled_units,
                } => {
                    rebuilt.insert(name.clone());
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::Done { compiled_units },
                    });
                    Self::unlock(&name, &dependents, &mut in_degree, &mut queue, |_| {});
                }
                TaskResult::UpToDate { name } => {
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::UpToDate,
                    });
                    Self::unlock(&name, &dependents, &mut in_degree, &mut queue, |_| {});
                }
                TaskResult::Failed { name, error } => {
                    if self.stop_on_failure {
                        halted = true;
                    }
                    reports.push(TargetReport {
                        name: name.clone(),
                        outcome: TargetOutcome::Failed { error },
                    });
                    Self::unlock(&name, &dependents, &mut in_degree, &mut queue, |d| {
                        blocked.entry(d.to_string()).or_insert(name.clone());
                    });
                }
            }
        }

        progress.finish();

        // Report in build order, not completion order
        let by_name: HashMap<String, TargetReport> = reports
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        Ok(order
            .iter()
            .filter_map(|name| by_name.get(name).cloned())
            .collect())
    }

    /// Decrement dependents' in-degrees, enqueue the ready ones, and let
    /// the caller mark them (e.g. as blocked by a failure).
    fn unlock(
        name: &str,
        dependents: &HashMap<String, Vec<String>>,
        in_degree: &mut HashMap<String, usize>,
        queue: &mut VecDeque<String>,
        mut mark: impl FnMut(&str),
    ) {
        let Some(deps) = dependents.get(name) else {
            return;
        };
        for dependent in deps {
            mark(dependent);
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent.clone());
                }
            }
        }
    }
}

/// Context for building a single target
#[derive(Clone)]
struct TaskContext {
    root: Utf8PathBuf,
    build_dir: Utf8PathBuf,
    source_extension: String,
    header_extension: String,
    toolchain: Toolchain,
    cache: Arc<Mutex<CacheManager>>,
    runner: Arc<dyn ProcessRunner>,
    enumerator: Arc<dyn SourceEnumerator>,
    semaphore: Arc<Semaphore>,
    progress: BuildProgress,
    force_rebuild: bool,
}

async fn build_target(ctx: TaskContext, target: ResolvedTarget, deps_rebuilt: bool) -> TaskResult {
    let name = target.name.clone();

    let units = match enumerate_units(
        &target,
        &ctx.source_extension,
        &ctx.build_dir,
        ctx.enumerator.as_ref(),
    ) {
        Ok(units) => units,
        Err(e) => {
            return TaskResult::Failed {
                name,
                error: e.to_string(),
            };
        }
    };

    let headers = match enumerate_headers(&target, &ctx.header_extension, ctx.enumerator.as_ref()) {
        Ok(headers) => headers,
        Err(e) => {
            return TaskResult::Failed {
                name,
                error: e.to_string(),
            };
        }
    };

    // Dependencies are terminal by scheduling order, so the snapshot is complete
    let snapshot = ctx.cache.lock().await.snapshot();
    let analysis = match staleness::analyze(
        &ctx.root,
        &target,
        &units,
        &headers,
        &ctx.source_extension,
        &snapshot,
        deps_rebuilt,
        ctx.force_rebuild,
    ) {
        Ok(report) => report,
        Err(e) => {
            return TaskResult::Failed {
                name,
                error: e.to_string(),
            };
        }
    };

    if analysis.stale_units.is_empty() && !analysis.needs_relink {
        tracing::info!("Skipping {} (up to date)", name);
        ctx.progress.skip_target(&name);
        return TaskResult::UpToDate { name };
    }

    tracing::info!(
        "Building {} ({}, {} units to compile)",
        name,
        target.kind,
        analysis.stale_units.len()
    );
    ctx.progress.start_target(&name, analysis.stale_units.len());

    let (pkg_cflags, pkg_libs) = match expand_pkg_config(&ctx, &target).await {
        Ok(flags) => flags,
        Err(error) => {
            ctx.progress.fail_target(&name, &error);
            return TaskResult::Failed { name, error };
        }
    };

    if let Err(e) = prepare_directories(&ctx.root, &units, &target) {
        let error = e.to_string();
        ctx.progress.fail_target(&name, &error);
        return TaskResult::Failed { name, error };
    }

    // Compile stale units under the global process budget
    let mut join_set: JoinSet<(crate::source::BuildUnit, Result<super::runner::ProcessOutput>)> =
        JoinSet::new();
    for unit in &analysis.stale_units {
        let invocation =
            command::compile_command(&ctx.toolchain, &target, unit, &pkg_cflags, &ctx.root);
        let runner = ctx.runner.clone();
        let semaphore = ctx.semaphore.clone();
        let unit = unit.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let result = tokio::task::spawn_blocking(move || runner.run(&invocation))
                .await
                .unwrap_or_else(|e| Err(Error::internal(format!("Compile task panicked: {}", e))));
            (unit, result)
        });
    }

    let mut compiled_units = 0usize;
    let mut first_error: Option<String> = None;

    while let Some(joined) = join_set.join_next().await {
        let (unit, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                first_error.get_or_insert(format!("Compile task panicked: {}", e));
                continue;
            }
        };

        match result {
            Ok(output) if output.success => {
                compiled_units += 1;
                ctx.progress.unit_done(&name);
                ctx.progress.update_target(&name, unit.source.as_str());

                let content_hash = analysis
                    .content_hashes
                    .get(&unit.source)
                    .cloned()
                    .unwrap_or_default();
                let mut cache = ctx.cache.lock().await;
                if let Err(e) = cache.record_unit(
                    &unit.source,
                    content_hash,
                    analysis.flag_fingerprint.clone(),
                ) {
                    first_error.get_or_insert(e.to_string());
                }
            }
            Ok(output) => {
                let failure = Error::CompileFailure {
                    target: name.clone(),
                    source_file: unit.source.to_string(),
                    diagnostics: output.diagnostics.clone(),
                };
                tracing::error!(target_name = %name, source = %unit.source, "{}", output.diagnostics);
                let first_line = output.diagnostics.lines().next().unwrap_or("").to_string();
                first_error.get_or_insert(format!("{}: {}", failure, first_line));
            }
            Err(e) => {
                first_error.get_or_insert(e.to_string());
            }
        }
    }

    if let Some(error) = first_error {
        ctx.progress.fail_target(&name, &error);
        return TaskResult::Failed { name, error };
    }

    // Link once every unit of the target has resolved
    let objects: Vec<Utf8PathBuf> = units.iter().map(|u| u.object.clone()).collect();
    let invocation = command::link_command(&ctx.toolchain, &target, &objects, &pkg_libs, &ctx.root);
    let runner = ctx.runner.clone();
    let link_result = tokio::task::spawn_blocking(move || runner.run(&invocation))
        .await
        .unwrap_or_else(|e| Err(Error::internal(format!("Link task panicked: {}", e))));

    match link_result {
        Ok(output) if output.success => {
            let mut cache = ctx.cache.lock().await;
            if let Err(e) =
                cache.record_artifact(&target.artifact_path(), analysis.link_fingerprint.clone())
            {
                let error = e.to_string();
                ctx.progress.fail_target(&name, &error);
                return TaskResult::Failed { name, error };
            }
            drop(cache);

            ctx.progress.finish_target(&name);
            TaskResult::Built {
                name,
                compiled_units,
            }
        }
        Ok(output) => {
            let failure = Error::LinkFailure {
                target: name.clone(),
                diagnostics: output.diagnostics.clone(),
            };
            tracing::error!(target_name = %name, "{}", output.diagnostics);
            let first_line = output.diagnostics.lines().next().unwrap_or("").to_string();
            let error = format!("{}: {}", failure, first_line);
            ctx.progress.fail_target(&name, &error);
            TaskResult::Failed { name, error }
        }
        Err(e) => {
            let error = e.to_string();
            ctx.progress.fail_target(&name, &error);
            TaskResult::Failed { name, error }
        }
    }
}

/// Expand pkg_config entries into compiler and linker flags through the
/// process runner, keeping the command synthesizer pure.
async fn expand_pkg_config(
    ctx: &TaskContext,
    target: &ResolvedTarget,
) -> std::result::Result<(Vec<String>, Vec<String>), String> {
    let mut cflags = Vec::new();
    let mut libs = Vec::new();

    for package in &target.pkg_config {
        for (want_libs, out) in [(false, &mut cflags), (true, &mut libs)] {
            let invocation =
                command::pkg_config_command(&ctx.toolchain, package, want_libs, &ctx.root);
            let runner = ctx.runner.clone();
            let output = tokio::task::spawn_blocking(move || runner.run(&invocation))
                .await
                .map_err(|e| format!("pkg-config task panicked: {}", e))?
                .map_err(|e| e.to_string())?;

            if !output.success {
                return Err(format!(
                    "pkg-config failed for '{}': {}",
                    package,
                    output.diagnostics.lines().next().unwrap_or("")
                ));
            }
            out.extend(output.diagnostics.split_whitespace().map(str::to_string));
        }
    }

    Ok((cflags, libs))
}

/// Create the object, bin and lib directories a target writes into
fn prepare_directories(
    root: &Utf8Path,
    units: &[crate::source::BuildUnit],
    target: &ResolvedTarget,
) -> Result<()> {
    for unit in units {
        if let Some(parent) = unit.object.parent() {
            std::fs::create_dir_all(root.join(parent))?;
        }
    }
    if let Some(parent) = target.artifact_path().parent() {
        std::fs::create_dir_all(root.join(parent))?;
    }
    Ok(())
}
