//! Worker pool orchestration: drive the graph to completion.
//!
//! The [`Orchestrator`] owns the run: it builds the scheduling frontier,
//! spawns exactly `threads` worker loops, dispatches ready nodes to the
//! [`ModelRunner`], records results, and emits one result line per completed
//! node. Three stop conditions are honored:
//!
//! - **completion** — every node accounted for,
//! - **fail-fast** — after the first node error, in-flight nodes finish and
//!   everything unstarted is recorded as skipped,
//! - **interrupt** — in-flight adapter work is cancelled (exactly one
//!   `cancel_all_connections` call) and the run returns
//!   [`OrchestratorError::Interrupted`] instead of results.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tracing::instrument;
use uuid::Uuid;

use crate::adapter::Adapter;
use crate::compile::SqlCompiler;
use crate::config::RunConfig;
use crate::event_bus::{Event, EventBus};
use crate::graph::{Graph, GraphError, GraphQueue};
use crate::manifest::Manifest;
use crate::results::{RunResult, RunSummary};
use crate::runner::{ModelRunner, RunnerError};

/// Errors that cross the orchestrator boundary.
///
/// Ordinary node failures never appear here — they are typed results in the
/// [`RunOutcome`]. Only interrupts and infrastructure failures abort a run.
#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error("run interrupted")]
    #[diagnostic(
        code(strata::orchestrator::interrupted),
        help("In-flight warehouse work was cancelled before the run stopped.")
    )]
    Interrupted,

    #[error("worker task failed: {0}")]
    #[diagnostic(code(strata::orchestrator::join))]
    Join(#[from] JoinError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

/// Everything a completed run produces.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub invocation_id: String,
    /// One result per executable node, in completion order.
    pub results: Vec<RunResult>,
    pub summary: RunSummary,
}

/// Cooperative interrupt flag, injected instead of read from ambient state.
///
/// Production wires it to Ctrl-C via
/// [`spawn_ctrl_c_listener`](Self::spawn_ctrl_c_listener); tests call
/// [`trigger`](Self::trigger) directly.
#[derive(Debug, Default)]
pub struct InterruptSignal {
    notify: Notify,
    triggered: AtomicBool,
}

impl InterruptSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt. Idempotent.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Park until the interrupt is raised.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Forward Ctrl-C to this signal for the life of the process.
    pub fn spawn_ctrl_c_listener(self: &Arc<Self>) {
        let signal = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.trigger();
            }
        });
    }
}

/// Owns the worker pool and drives one run to a stop condition.
pub struct Orchestrator {
    manifest: Arc<Manifest>,
    graph: Graph,
    adapter: Arc<dyn Adapter>,
    compiler: Arc<dyn SqlCompiler>,
    config: RunConfig,
    event_bus: EventBus,
    interrupt: Arc<InterruptSignal>,
    cancelled: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Validate the manifest and build an orchestrator with the bus declared
    /// in the configuration.
    pub fn new(
        manifest: Manifest,
        adapter: Arc<dyn Adapter>,
        compiler: Arc<dyn SqlCompiler>,
        config: RunConfig,
    ) -> Result<Self, OrchestratorError> {
        let event_bus = config.event_bus.build_event_bus();
        Self::with_bus(manifest, adapter, compiler, config, event_bus)
    }

    /// Same as [`new`](Self::new) but with a caller-provided event bus, for
    /// custom sinks (capture, streaming).
    pub fn with_bus(
        manifest: Manifest,
        adapter: Arc<dyn Adapter>,
        compiler: Arc<dyn SqlCompiler>,
        config: RunConfig,
        event_bus: EventBus,
    ) -> Result<Self, OrchestratorError> {
        let graph = Graph::from_manifest(&manifest)?;
        Ok(Self {
            manifest: Arc::new(manifest),
            graph,
            adapter,
            compiler,
            config,
            event_bus,
            interrupt: Arc::new(InterruptSignal::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The signal that interrupts this run.
    #[must_use]
    pub fn interrupt_signal(&self) -> Arc<InterruptSignal> {
        Arc::clone(&self.interrupt)
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Execute every node to completion or to a stop condition.
    #[instrument(skip(self), err)]
    pub async fn run(&self) -> Result<RunOutcome, OrchestratorError> {
        let invocation_id = Uuid::new_v4().to_string();
        let started = Utc::now();
        self.event_bus.listen_for_events();
        let events = self.event_bus.get_sender();

        tracing::info!(
            invocation = %invocation_id,
            nodes = self.graph.len(),
            threads = self.config.threads,
            fail_fast = self.config.fail_fast,
            full_refresh = self.config.full_refresh,
            "run started"
        );

        let queue = Arc::new(self.graph.queue(self.config.preserve_edges));
        let halt = Arc::new(AtomicBool::new(false));
        let results: Arc<parking_lot::Mutex<Vec<RunResult>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let runner = Arc::new(ModelRunner::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.compiler),
            self.config.clone(),
            events.clone(),
        ));

        // On interrupt: stop handing out nodes, then cancel in-flight
        // adapter work so parked workers observe the cancellation.
        let watcher: JoinHandle<()> = tokio::spawn({
            let interrupt = Arc::clone(&self.interrupt);
            let queue = Arc::clone(&queue);
            let adapter = Arc::clone(&self.adapter);
            let cancelled = Arc::clone(&self.cancelled);
            async move {
                interrupt.wait().await;
                queue.close();
                cancel_connections_once(&cancelled, adapter.as_ref()).await;
            }
        });

        let mut handles: Vec<JoinHandle<Result<(), RunnerError>>> = Vec::new();
        for worker in 0..self.config.threads {
            handles.push(tokio::spawn(worker_loop(
                worker,
                Arc::clone(&queue),
                Arc::clone(&self.manifest),
                Arc::clone(&runner),
                Arc::clone(&results),
                Arc::clone(&halt),
                self.config.fail_fast,
                events.clone(),
                Arc::clone(&self.interrupt),
            )));
        }

        let mut interrupted = false;
        for joined in futures_util::future::join_all(handles).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(RunnerError::Interrupted)) => interrupted = true,
                Err(join_error) => {
                    watcher.abort();
                    return Err(OrchestratorError::Join(join_error));
                }
            }
        }

        if interrupted || self.interrupt.is_triggered() {
            // Wake the watcher if the interrupt surfaced from an adapter
            // rather than the signal, then let it finish the cancellation.
            self.interrupt.trigger();
            let _ = watcher.await;
            cancel_connections_once(&self.cancelled, self.adapter.as_ref()).await;
            self.event_bus.stop_listener().await;
            tracing::warn!(invocation = %invocation_id, "run interrupted");
            return Err(OrchestratorError::Interrupted);
        }
        watcher.abort();

        let results = std::mem::take(&mut *results.lock());
        let elapsed = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;
        let summary = RunSummary::from_results(&results, elapsed);

        let _ = events.send(Event::diagnostic(
            "run",
            format!(
                "Finished running {} nodes in {elapsed:.2}s ({summary})",
                results.len()
            ),
        ));
        tracing::info!(invocation = %invocation_id, %summary, "run finished");

        self.event_bus.stop_listener().await;
        Ok(RunOutcome {
            invocation_id,
            results,
            summary,
        })
    }
}

/// One pull-loop: take a ready node, execute it, record and report.
#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker: usize,
    queue: Arc<GraphQueue>,
    manifest: Arc<Manifest>,
    runner: Arc<ModelRunner>,
    results: Arc<parking_lot::Mutex<Vec<RunResult>>>,
    halt: Arc<AtomicBool>,
    fail_fast: bool,
    events: flume::Sender<Event>,
    interrupt: Arc<InterruptSignal>,
) -> Result<(), RunnerError> {
    while let Some(node_id) = queue.get_ready().await {
        let Some(node) = manifest.get(&node_id) else {
            // Graph construction guarantees this cannot happen; account for
            // the node anyway so the queue terminates.
            queue.mark_done(&node_id, false);
            continue;
        };

        tracing::debug!(worker, node = %node_id, "dispatching node");
        let result = match runner.run(node).await {
            Ok(result) => result,
            Err(err) => {
                // Raise the shared signal so in-flight siblings are
                // cancelled too, then wind this worker down.
                interrupt.trigger();
                queue.close();
                return Err(err);
            }
        };
        let succeeded = !result.status.is_failure();

        emit_result_line(&events, &result);
        results.lock().push(result);

        let cascade_skipped = queue.mark_done(&node_id, succeeded);
        for skipped_id in cascade_skipped {
            let skip = RunResult::skipped_upstream_failure(skipped_id, &node_id);
            emit_result_line(&events, &skip);
            results.lock().push(skip);
        }

        if !succeeded && fail_fast && !halt.swap(true, Ordering::SeqCst) {
            for drained_id in queue.drain_pending() {
                let skip = RunResult::skipped_fail_fast(drained_id);
                emit_result_line(&events, &skip);
                results.lock().push(skip);
            }
        }
    }
    Ok(())
}

/// Emit the one result line for a completed node: INFO for
/// success/skip/partial, ERROR for failure, mirrored on the event bus.
fn emit_result_line(events: &flume::Sender<Event>, result: &RunResult) {
    if result.status.is_failure() {
        tracing::error!(
            node = %result.node_id,
            status = %result.status,
            execution_time = result.execution_time,
            "{}",
            result.message
        );
    } else {
        tracing::info!(
            node = %result.node_id,
            status = %result.status,
            execution_time = result.execution_time,
            "{}",
            result.message
        );
    }
    let _ = events.send(Event::result_line(result));
}

/// Cancel in-flight connections at most once per run.
async fn cancel_connections_once(cancelled: &AtomicBool, adapter: &dyn Adapter) {
    if cancelled.swap(true, Ordering::SeqCst) {
        return;
    }
    tracing::warn!("cancelling all in-flight connections");
    if let Err(err) = adapter.cancel_all_connections().await {
        tracing::error!(error = %err, "failed to cancel connections");
    }
}
