//! Per-node execution policy.
//!
//! The [`ModelRunner`] selects and executes exactly one materialization
//! branch per node, in precedence order:
//!
//! 1. Effective full refresh → full rebuild.
//! 2. Incremental with a compatible existing relation → incremental append.
//! 3. Incremental without one → full rebuild (nothing to append to).
//! 4. Materialized view → configuration-change reconciliation.
//! 5. Everything else → full rebuild per the declared kind.
//!
//! Any adapter or compile failure inside a node is caught at this boundary
//! and converted into a [`RunStatus::Error`] result. The single exception is
//! the interrupt class ([`AdapterError::Interrupted`]), which crosses the
//! boundary unmodified as [`RunnerError::Interrupted`].

pub mod batch;
pub mod reconcile;

pub use reconcile::ConfigurationChange;

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::adapter::{Adapter, AdapterError, AdapterResponse, Relation};
use crate::compile::{CompileContext, CompileError, SqlCompiler};
use crate::config::RunConfig;
use crate::event_bus::Event;
use crate::manifest::ModelNode;
use crate::results::{BatchResults, RunResult, RunStatus, TimingInfo};
use crate::types::Materialization;

/// The only error that escapes [`ModelRunner::run`].
///
/// Ordinary failures become error results; an interrupt is re-raised so the
/// orchestrator can cancel in-flight work and stop the run.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("node execution interrupted")]
    #[diagnostic(code(strata::runner::interrupted))]
    Interrupted,
}

/// Internal failure raised while executing one node, before conversion into
/// a typed result at the `run` boundary.
#[derive(Debug, Error)]
pub(crate) enum ExecutionFailure {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl ExecutionFailure {
    fn is_interrupt(&self) -> bool {
        matches!(self, ExecutionFailure::Adapter(err) if err.is_interrupt())
    }
}

/// Partially-assembled outcome of a successful branch execution.
pub(crate) struct Execution {
    pub(crate) status: RunStatus,
    pub(crate) message: String,
    pub(crate) response: AdapterResponse,
    pub(crate) batch: Option<(BatchResults, u64)>,
}

impl Execution {
    pub(crate) fn success(message: impl Into<String>, response: AdapterResponse) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
            response,
            batch: None,
        }
    }
}

/// Executes one node at a time against the adapter.
///
/// Stateless apart from injected collaborators; one instance is shared by
/// every worker in the pool.
pub struct ModelRunner {
    pub(crate) adapter: Arc<dyn Adapter>,
    pub(crate) compiler: Arc<dyn SqlCompiler>,
    pub(crate) config: RunConfig,
    events: flume::Sender<Event>,
}

impl ModelRunner {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn Adapter>,
        compiler: Arc<dyn SqlCompiler>,
        config: RunConfig,
        events: flume::Sender<Event>,
    ) -> Self {
        Self {
            adapter,
            compiler,
            config,
            events,
        }
    }

    /// Execute one node and produce its result.
    #[instrument(skip(self, node), fields(node = %node.id))]
    pub async fn run(&self, node: &ModelNode) -> Result<RunResult, RunnerError> {
        let span = TimingInfo::begin("execute");
        let outcome = match &node.batch {
            Some(batch_config) => batch::run_microbatch(self, node, batch_config).await,
            None => self.execute_materialization(node).await,
        };
        let span = span.complete();

        match outcome {
            Ok(execution) => {
                let failures = match &execution.batch {
                    Some((_, failed)) => Some(*failed),
                    None if execution.status.is_failure() => Some(1),
                    None => Some(0),
                };
                let mut result = RunResult {
                    node_id: node.id.clone(),
                    status: execution.status,
                    execution_time: span.elapsed_secs(),
                    timing: vec![span],
                    adapter_response: execution.response,
                    message: execution.message,
                    failures,
                    batch_results: None,
                };
                if let Some((batch_results, failed)) = execution.batch {
                    result = result.with_batch_results(batch_results, failed);
                }
                Ok(result)
            }
            Err(failure) if failure.is_interrupt() => Err(RunnerError::Interrupted),
            Err(failure) => {
                tracing::debug!(node = %node.id, error = %failure, "node execution failed");
                Ok(RunResult::error(
                    node.id.clone(),
                    failure.to_string(),
                    vec![span],
                ))
            }
        }
    }

    async fn execute_materialization(
        &self,
        node: &ModelNode,
    ) -> Result<Execution, ExecutionFailure> {
        let relation = self.adapter.get_relation(&node.relation_ref()).await?;
        match node.materialization {
            Materialization::MaterializedView => {
                reconcile::reconcile_materialized_view(self, node, relation).await
            }
            _ => self.build(node, relation).await,
        }
    }

    /// Standard build: full rebuild or incremental append.
    async fn build(
        &self,
        node: &ModelNode,
        relation: Option<Relation>,
    ) -> Result<Execution, ExecutionFailure> {
        let incremental = is_incremental(node, relation.as_ref(), self.config.full_refresh);
        let context = if incremental {
            CompileContext::incremental_append()
        } else {
            CompileContext::full_build(effective_full_refresh(node, self.config.full_refresh))
        };
        let sql = self.compiler.compile(node, &context).await?;
        let result = self.adapter.execute(&sql).await?;

        let message = if result.response.message.is_empty() {
            if incremental {
                format!("appended to {}", node.relation_ref())
            } else {
                format!("created {} {}", node.materialization, node.relation_ref())
            }
        } else {
            result.response.message.clone()
        };
        Ok(Execution::success(message, result.response))
    }

    /// Send an event, dropping it if the bus has shut down.
    pub(crate) fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::debug!("event channel closed; event dropped");
        }
    }
}

/// The node-level full-refresh override wins in both directions; the global
/// flag decides only when the node leaves it unset.
#[must_use]
pub fn effective_full_refresh(node: &ModelNode, full_refresh_flag: bool) -> bool {
    node.full_refresh.unwrap_or(full_refresh_flag)
}

/// Whether a node should append to an existing relation instead of
/// rebuilding it.
///
/// True only when a prior relation exists, its type matches the expected
/// type for the node's materialization, the materialization is incremental,
/// and full refresh is not in effect.
#[must_use]
pub fn is_incremental(
    node: &ModelNode,
    relation: Option<&Relation>,
    full_refresh_flag: bool,
) -> bool {
    let Some(relation) = relation else {
        return false;
    };
    let type_matches = node
        .materialization
        .expected_relation_type()
        .map(|expected| relation.is_type(expected))
        .unwrap_or(false);

    type_matches
        && node.materialization == Materialization::Incremental
        && !effective_full_refresh(node, full_refresh_flag)
}
