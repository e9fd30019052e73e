//! Parallel execution scheduler

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::container::{
    CompletionWaiter, ContainerRuntime, ExecutionUnit, LaunchOptions, UnitLauncher, UnitTracker,
};
use crate::error::classification::ErrorCategory;
use crate::error::{RalphError, RalphResult};
use crate::evidence::writer::emit;
use crate::evidence::{error_category_label, generate_run_id, EvidenceWriter, LifecycleEvent};
use crate::git::{BranchIntegrator, GitOps, MergeOutcome, DEFAULT_BASE_BRANCH};
use crate::manifest::{Manifest, ManifestStore, SubSpecStatus};
use crate::parallel::dependency::DependencyGraph;
use crate::paths::RalphPaths;
use crate::timeout::TimeoutConfig;
use crate::ui::ParallelDisplay;

/// Configuration options for a parallel run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Spec whose manifest is scheduled.
    pub spec: String,
    /// Maximum number of execution units running at once.
    pub parallel: u32,
    /// Iteration ceiling passed to every unit.
    pub iterations: u32,
    /// Pass `--verbose` to units.
    pub verbose: bool,
    /// Branch sub-spec branches are created from.
    pub base_branch: String,
    /// Poll interval, unit timeout and git timeout.
    pub timeouts: TimeoutConfig,
}

impl SchedulerConfig {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            parallel: 3,
            iterations: 100,
            verbose: false,
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Final state of a run that ended without a fatal error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub complete: usize,
    pub total: usize,
    pub batches: usize,
    /// Every sub-spec with its status, in manifest order.
    pub statuses: Vec<(String, SubSpecStatus)>,
}

impl RunSummary {
    fn from_graph(run_id: &str, graph: &DependencyGraph, batches: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            complete: graph.count(SubSpecStatus::Complete),
            total: graph.len(),
            batches,
            statuses: graph
                .statuses()
                .map(|(name, status)| (name.to_string(), status))
                .collect(),
        }
    }

    pub fn all_complete(&self) -> bool {
        self.complete == self.total
    }

    /// Sub-specs that ended `failed` or `merge_conflict`.
    pub fn unfinished(&self) -> Vec<(String, SubSpecStatus)> {
        unfinished(self.statuses.iter().map(|(n, s)| (n.as_str(), *s)))
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_complete() {
            0
        } else {
            1
        }
    }
}

fn unfinished<'a>(
    statuses: impl Iterator<Item = (&'a str, SubSpecStatus)>,
) -> Vec<(String, SubSpecStatus)> {
    statuses
        .filter(|(_, s)| matches!(s, SubSpecStatus::Failed | SubSpecStatus::MergeConflict))
        .map(|(n, s)| (n.to_string(), s))
        .collect()
}

/// How a batch ended.
#[derive(Debug, PartialEq, Eq)]
enum BatchOutcome {
    Completed,
    AllLaunchesFailed { attempted: usize },
    Interrupted { stopped: usize },
}

/// Drives a spec's sub-specs through launch, wait, merge and checkpoint
/// cycles until nothing more can run.
pub struct ParallelScheduler {
    config: SchedulerConfig,
    paths: RalphPaths,
    store: ManifestStore,
    launcher: UnitLauncher,
    waiter: CompletionWaiter,
    integrator: BranchIntegrator,
    tracker: UnitTracker,
    display: ParallelDisplay,
    /// Flipped to `true` to ask the run to stop.
    cancel_tx: Arc<watch::Sender<bool>>,
    /// Last known `(complete, total)`, reported when the run ends in error.
    progress: (usize, usize),
}

impl ParallelScheduler {
    pub fn new(
        config: SchedulerConfig,
        paths: RalphPaths,
        runtime: Arc<dyn ContainerRuntime>,
        git: Arc<dyn GitOps>,
    ) -> Self {
        let (cancel_tx, _cancel_rx) = watch::channel(false);
        Self {
            store: ManifestStore::new(paths.clone()),
            launcher: UnitLauncher::new(runtime.clone(), git.clone(), paths.clone()),
            waiter: CompletionWaiter::new(runtime.clone(), &config.timeouts),
            integrator: BranchIntegrator::new(git, paths.clone()),
            tracker: UnitTracker::new(runtime),
            display: ParallelDisplay::new(),
            cancel_tx: Arc::new(cancel_tx),
            progress: (0, 0),
            config,
            paths,
        }
    }

    /// Override where the Ralph library and the image build context live.
    pub fn with_launch_dirs(mut self, lib_dir: Option<PathBuf>, docker_context: Option<PathBuf>) -> Self {
        if let Some(lib_dir) = lib_dir {
            self.launcher = self.launcher.with_lib_dir(lib_dir);
        }
        if let Some(context) = docker_context {
            self.launcher = self.launcher.with_docker_context(context);
        }
        self
    }

    pub fn with_display(mut self, display: ParallelDisplay) -> Self {
        self.display = display;
        self
    }

    /// Handle on the live units, shared with the signal handler.
    pub fn tracker(&self) -> UnitTracker {
        self.tracker.clone()
    }

    /// Sender that interrupts the run when `true` is sent.
    pub fn cancel_handle(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.cancel_tx)
    }

    /// Run until every sub-spec is complete or nothing more can run.
    ///
    /// Returns the summary when the loop ends normally, whether or not all
    /// sub-specs completed. Stuck graphs, cycles, a batch where every launch
    /// failed and interrupts are errors. Statuses are persisted before any
    /// of these return.
    pub async fn run(&mut self) -> RalphResult<RunSummary> {
        let run_id = generate_run_id();
        let mut evidence = match EvidenceWriter::try_new(&self.paths, run_id.clone()) {
            Ok(writer) => Some(writer),
            Err(err) => {
                warn!("Failed to initialize evidence writer: {}", err);
                None
            }
        };

        // Leftover units are force-removed even if this future is dropped.
        let _guard = self.tracker.guard();
        let result = self.run_cycles(&run_id, &mut evidence).await;
        emit_run_complete(&mut evidence, &result, self.progress);
        result
    }

    async fn run_cycles(
        &mut self,
        run_id: &str,
        evidence: &mut Option<EvidenceWriter>,
    ) -> RalphResult<RunSummary> {
        let spec = self.config.spec.clone();
        let mut manifest = self.store.load(&spec)?;

        let mut graph = DependencyGraph::build(&manifest)?;
        let stale = graph.reset_in_progress();
        if !stale.is_empty() {
            info!(count = stale.len(), "resetting stale in_progress sub-specs");
            self.display.stale_reset(&stale);
            manifest.apply_statuses(graph.statuses());
            if let Err(err) = self.store.save(&spec, &manifest) {
                warn!("Failed to save manifest: {}", err);
            }
        }

        self.progress = (graph.count(SubSpecStatus::Complete), graph.len());
        self.display.run_header(
            &spec,
            graph.len(),
            graph.count(SubSpecStatus::Complete),
            self.config.parallel,
        );
        emit(
            evidence,
            LifecycleEvent::RunStart {
                spec: spec.clone(),
                total: graph.len(),
                complete: graph.count(SubSpecStatus::Complete),
                parallel: self.config.parallel,
                base_branch: self.config.base_branch.clone(),
            },
        );

        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut batches = 0;
        loop {
            let mut graph = DependencyGraph::build(&manifest)?;
            if graph.is_complete() {
                break;
            }
            if *cancel_rx.borrow() {
                self.display.interrupted(0);
                return Err(RalphError::Interrupted { stopped: 0 });
            }

            let eligible = graph.eligible();
            if eligible.is_empty() {
                if graph.count(SubSpecStatus::Pending) == 0 {
                    // Only failed or conflicted sub-specs are left.
                    break;
                }
                let err = graph.diagnose_stall();
                error!("{}", err);
                self.print_summary(&graph);
                return Err(err.into());
            }

            let batch: Vec<String> = eligible
                .into_iter()
                .take(self.config.parallel.max(1) as usize)
                .collect();
            batches += 1;
            info!(batch = batches, size = batch.len(), "starting batch");

            let outcome = self
                .run_batch(&mut graph, &batch, &mut cancel_rx, evidence)
                .await;

            manifest.apply_statuses(graph.statuses());
            self.checkpoint(&spec, &manifest, &graph, evidence).await;
            self.progress = (graph.count(SubSpecStatus::Complete), graph.len());

            match outcome {
                BatchOutcome::Completed => {
                    self.display
                        .progress(graph.count(SubSpecStatus::Complete), graph.len());
                }
                BatchOutcome::AllLaunchesFailed { attempted } => {
                    error!("All launches failed");
                    self.print_summary(&graph);
                    return Err(RalphError::AllLaunchesFailed { attempted });
                }
                BatchOutcome::Interrupted { stopped } => {
                    self.display.interrupted(stopped);
                    return Err(RalphError::Interrupted { stopped });
                }
            }
        }

        let graph = DependencyGraph::build(&manifest)?;
        self.print_summary(&graph);
        Ok(RunSummary::from_graph(run_id, &graph, batches))
    }

    /// Launch, wait for and integrate one batch, recording every status in
    /// `graph`.
    async fn run_batch(
        &mut self,
        graph: &mut DependencyGraph,
        batch: &[String],
        cancel_rx: &mut watch::Receiver<bool>,
        evidence: &mut Option<EvidenceWriter>,
    ) -> BatchOutcome {
        let spec = self.config.spec.clone();
        let options = LaunchOptions {
            base_branch: self.config.base_branch.clone(),
            iterations: self.config.iterations,
            verbose: self.config.verbose,
        };

        self.display.batch_started(batch);
        let mut units: Vec<ExecutionUnit> = Vec::with_capacity(batch.len());
        for name in batch {
            graph.set_status(name, SubSpecStatus::InProgress);
            match self.launcher.launch(&spec, name, &options).await {
                Ok(unit) => {
                    self.tracker.track(&unit.container_name);
                    self.display.unit_launched(&unit);
                    emit(
                        evidence,
                        LifecycleEvent::Launched {
                            sub_spec: unit.sub_spec.clone(),
                            container: unit.container_name.clone(),
                            branch: unit.branch.clone(),
                        },
                    );
                    units.push(unit);
                }
                Err(err) => {
                    warn!("Failed to launch {}: {}", name, err);
                    self.display.launch_failed(name, &err.to_string());
                    graph.set_status(name, SubSpecStatus::Failed);
                    emit_finished(
                        evidence,
                        name,
                        SubSpecStatus::Failed,
                        None,
                        Some((ErrorCategory::Launch, err.to_string())),
                    );
                }
            }
        }

        if units.is_empty() {
            return BatchOutcome::AllLaunchesFailed {
                attempted: batch.len(),
            };
        }

        self.display.waiting(units.len());
        let mut pending: FuturesUnordered<_> = units
            .iter()
            .cloned()
            .map(|unit| {
                let waiter = self.waiter.clone();
                async move {
                    let code = waiter.wait(&unit).await;
                    (unit, code)
                }
            })
            .collect();

        let mut finished: Vec<(ExecutionUnit, i32)> = Vec::with_capacity(units.len());
        let mut interrupted = false;
        while !pending.is_empty() {
            tokio::select! {
                Some(result) = pending.next() => finished.push(result),
                Ok(()) = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        interrupted = true;
                        break;
                    }
                }
            }
        }
        drop(pending);
        self.display.finish_waiting();

        if interrupted {
            return self.interrupt_batch(graph, &units, &finished, evidence).await;
        }

        for (unit, code) in finished {
            let status = if code == 0 {
                match self.integrator.merge(&spec, &unit.branch).await {
                    MergeOutcome::Merged => {
                        emit_finished(evidence, &unit.sub_spec, SubSpecStatus::Complete, Some(code), None);
                        SubSpecStatus::Complete
                    }
                    MergeOutcome::Conflict { reason, .. } => {
                        emit_finished(
                            evidence,
                            &unit.sub_spec,
                            SubSpecStatus::MergeConflict,
                            Some(code),
                            Some((ErrorCategory::Integration, reason)),
                        );
                        SubSpecStatus::MergeConflict
                    }
                }
            } else {
                warn!(
                    "Sub-spec {} failed (exit {}), container {}, branch {}",
                    unit.sub_spec, code, unit.container_name, unit.branch
                );
                emit_finished(
                    evidence,
                    &unit.sub_spec,
                    SubSpecStatus::Failed,
                    Some(code),
                    Some((ErrorCategory::Execution, format!("exit code {}", code))),
                );
                SubSpecStatus::Failed
            };

            graph.set_status(&unit.sub_spec, status);
            self.display.unit_finished(&unit.sub_spec, Some(code), status);
            self.tracker.remove(&unit.container_name).await;
        }

        BatchOutcome::Completed
    }

    /// Stop the batch after an interrupt. Units that already failed keep
    /// `failed`; everything else goes back to `pending` for the next run.
    async fn interrupt_batch(
        &mut self,
        graph: &mut DependencyGraph,
        units: &[ExecutionUnit],
        finished: &[(ExecutionUnit, i32)],
        evidence: &mut Option<EvidenceWriter>,
    ) -> BatchOutcome {
        let failed: HashSet<&str> = finished
            .iter()
            .filter(|(_, code)| *code != 0)
            .map(|(unit, _)| unit.sub_spec.as_str())
            .collect();

        for unit in units {
            if failed.contains(unit.sub_spec.as_str()) {
                graph.set_status(&unit.sub_spec, SubSpecStatus::Failed);
                emit_finished(
                    evidence,
                    &unit.sub_spec,
                    SubSpecStatus::Failed,
                    None,
                    Some((ErrorCategory::Execution, "failed before interrupt".to_string())),
                );
            } else {
                graph.set_status(&unit.sub_spec, SubSpecStatus::Pending);
            }
        }

        let stopped = self
            .tracker
            .stop_all(self.config.timeouts.stop_grace_period)
            .await;
        BatchOutcome::Interrupted { stopped }
    }

    /// Persist statuses, then commit and push the manifest. Failures are
    /// logged; the in-memory manifest stays authoritative.
    async fn checkpoint(
        &self,
        spec: &str,
        manifest: &Manifest,
        graph: &DependencyGraph,
        evidence: &mut Option<EvidenceWriter>,
    ) {
        let complete = graph.count(SubSpecStatus::Complete);
        let total = graph.len();

        let saved = match self.store.save(spec, manifest) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to save manifest: {}", err);
                false
            }
        };
        if saved {
            if let Err(err) = self.integrator.commit_checkpoint(spec, complete, total).await {
                warn!("Failed to commit manifest checkpoint: {}", err);
            }
        }

        emit(
            evidence,
            LifecycleEvent::Checkpoint {
                complete,
                total,
                saved,
            },
        );
    }

    fn print_summary(&self, graph: &DependencyGraph) {
        self.display.summary(
            &self.config.spec,
            graph.count(SubSpecStatus::Complete),
            graph.len(),
            &unfinished(graph.statuses()),
        );
    }
}

fn emit_finished(
    evidence: &mut Option<EvidenceWriter>,
    sub_spec: &str,
    status: SubSpecStatus,
    exit_code: Option<i32>,
    error: Option<(ErrorCategory, String)>,
) {
    let (error_type, error_message) = match error {
        Some((category, message)) => (
            Some(error_category_label(category).to_string()),
            Some(message),
        ),
        None => (None, None),
    };
    emit(
        evidence,
        LifecycleEvent::SubSpecFinished {
            sub_spec: sub_spec.to_string(),
            status,
            exit_code,
            error_type,
            error_message,
        },
    );
}

fn emit_run_complete(
    evidence: &mut Option<EvidenceWriter>,
    result: &RalphResult<RunSummary>,
    (complete, total): (usize, usize),
) {
    let event = match result {
        Ok(summary) => LifecycleEvent::RunComplete {
            status: if summary.all_complete() {
                "success".to_string()
            } else {
                "incomplete".to_string()
            },
            complete: summary.complete,
            total: summary.total,
            error_type: None,
            error_message: None,
        },
        Err(err) => {
            let category = err.classify();
            LifecycleEvent::RunComplete {
                status: if category == ErrorCategory::Interrupted {
                    "interrupted".to_string()
                } else {
                    "failed".to_string()
                },
                complete,
                total,
                error_type: Some(error_category_label(category).to_string()),
                error_message: Some(err.to_string()),
            }
        }
    };
    emit(evidence, event);
}
