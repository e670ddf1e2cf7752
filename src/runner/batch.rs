//! Microbatch execution: time-windowed sub-runs folded into one result.
//!
//! A node with a [`BatchConfig`] executes as a sequence of disjoint
//! half-open windows. Each window goes through the runner's normal
//! build/incremental path scoped to that window; outcomes fold into a single
//! node-level result:
//!
//! - `Success` iff every window succeeded,
//! - `Error` iff every window failed,
//! - `PartialSuccess` for a mixed outcome — a distinct terminal state that
//!   still unblocks dependents.
//!
//! Window failures are ordinary failures (recorded, not raised); only the
//! interrupt class aborts the remaining windows.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use crate::adapter::AdapterResponse;
use crate::compile::CompileContext;
use crate::manifest::{BatchConfig, ModelNode};
use crate::results::{BatchResults, BatchWindow, RunStatus};

use super::{effective_full_refresh, is_incremental, Execution, ExecutionFailure, ModelRunner};

/// Outcome of one window: the response on success, the failure message
/// otherwise.
#[derive(Clone, Debug)]
pub struct WindowOutcome {
    pub window: BatchWindow,
    pub outcome: Result<AdapterResponse, String>,
}

/// Folded view of a finished microbatch execution.
#[derive(Clone, Debug)]
pub struct BatchAggregate {
    pub status: RunStatus,
    pub results: BatchResults,
    pub failures: u64,
    pub message: String,
    pub response: AdapterResponse,
}

impl BatchAggregate {
    pub(crate) fn into_execution(self) -> Execution {
        Execution {
            status: self.status,
            message: self.message,
            response: self.response,
            batch: Some((self.results, self.failures)),
        }
    }
}

/// Split the run window into disjoint half-open `[start, end)` windows.
///
/// A full build covers everything from `begin`; an incremental run
/// reprocesses only the `lookback` most recent windows. The final window is
/// clamped to `now`, so the sequence exactly covers `[start, now)`.
#[must_use]
pub fn partition_windows(
    config: &BatchConfig,
    now: DateTime<Utc>,
    incremental: bool,
) -> Vec<BatchWindow> {
    let granularity = config.granularity;
    let start = if incremental {
        let mut cursor = granularity.truncate(now);
        for _ in 0..config.lookback {
            cursor = granularity.retreat(cursor);
        }
        cursor
    } else {
        match config.begin {
            Some(begin) => granularity.truncate(begin),
            None => {
                let mut cursor = granularity.truncate(now);
                for _ in 0..config.lookback {
                    cursor = granularity.retreat(cursor);
                }
                cursor
            }
        }
    };

    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < now {
        let next = granularity.advance(cursor);
        windows.push(BatchWindow::new(cursor, next.min(now)));
        cursor = next;
    }
    windows
}

/// Fold window outcomes into one node-level aggregate.
///
/// `results` lists windows in completion order; `failures` counts failed
/// windows exactly.
#[must_use]
pub fn fold_window_outcomes(outcomes: &[WindowOutcome]) -> BatchAggregate {
    let mut results = BatchResults::default();
    let mut response = AdapterResponse::default();
    let mut rows: i64 = 0;
    let mut saw_rows = false;

    for outcome in outcomes {
        match &outcome.outcome {
            Ok(batch_response) => {
                results.record_success(outcome.window);
                if let Some(affected) = batch_response.rows_affected {
                    rows += affected;
                    saw_rows = true;
                }
            }
            Err(_) => results.record_failure(outcome.window),
        }
    }
    if saw_rows {
        response.rows_affected = Some(rows);
    }

    let succeeded = results.successful.len();
    let failed = results.failed.len();
    let total = outcomes.len();
    let (status, message) = if failed == 0 {
        (RunStatus::Success, format!("{succeeded} batches processed"))
    } else if succeeded == 0 {
        (RunStatus::Error, format!("ERROR ({failed}/{total})"))
    } else {
        (
            RunStatus::PartialSuccess,
            format!("PARTIAL SUCCESS ({succeeded}/{total})"),
        )
    };

    BatchAggregate {
        status,
        results,
        failures: failed as u64,
        message,
        response,
    }
}

pub(crate) async fn run_microbatch(
    runner: &ModelRunner,
    node: &ModelNode,
    config: &BatchConfig,
) -> Result<Execution, ExecutionFailure> {
    let now = Utc::now();
    let relation = runner.adapter.get_relation(&node.relation_ref()).await?;
    let incremental = is_incremental(node, relation.as_ref(), runner.config.full_refresh);

    let mut windows = partition_windows(config, now, incremental);
    if windows.is_empty() {
        return Ok(Execution::success(
            "no batches to execute",
            AdapterResponse::default(),
        ));
    }

    tracing::debug!(
        node = %node.id,
        batches = windows.len(),
        incremental,
        "starting microbatch execution"
    );

    let mut outcomes: Vec<WindowOutcome> = Vec::with_capacity(windows.len());

    if !incremental {
        // The first window must create the relation before anything can
        // append to it, so it always runs alone.
        let first = windows.remove(0);
        let bootstrap = run_window(runner, node, first, false).await?;
        let bootstrap_failed = bootstrap.outcome.is_err();
        outcomes.push(bootstrap);
        if bootstrap_failed {
            // Nothing to append to; the remaining windows cannot run.
            for window in windows {
                outcomes.push(WindowOutcome {
                    window,
                    outcome: Err("relation was not created by the first batch".to_string()),
                });
            }
            let aggregate = fold_window_outcomes(&outcomes);
            return Ok(aggregate.into_execution());
        }
    }

    if config.concurrent {
        let futures = windows
            .into_iter()
            .map(|window| run_window(runner, node, window, true));
        for outcome in join_all(futures).await {
            outcomes.push(outcome?);
        }
    } else {
        for window in windows {
            outcomes.push(run_window(runner, node, window, true).await?);
        }
    }

    Ok(fold_window_outcomes(&outcomes).into_execution())
}

/// Execute one window. Ordinary failures land in the outcome; only the
/// interrupt class is raised.
async fn run_window(
    runner: &ModelRunner,
    node: &ModelNode,
    window: BatchWindow,
    incremental: bool,
) -> Result<WindowOutcome, ExecutionFailure> {
    let context = if incremental {
        CompileContext::incremental_append().with_batch_window(window)
    } else {
        CompileContext::full_build(effective_full_refresh(node, runner.config.full_refresh))
            .with_batch_window(window)
    };

    let sql = match runner.compiler.compile(node, &context).await {
        Ok(sql) => sql,
        Err(err) => {
            return Ok(WindowOutcome {
                window,
                outcome: Err(err.to_string()),
            });
        }
    };

    match runner.adapter.execute(&sql).await {
        Ok(result) => Ok(WindowOutcome {
            window,
            outcome: Ok(result.response),
        }),
        Err(err) if err.is_interrupt() => Err(ExecutionFailure::Adapter(err)),
        Err(err) => {
            tracing::debug!(node = %node.id, window = %window, error = %err, "batch failed");
            Ok(WindowOutcome {
                window,
                outcome: Err(err.to_string()),
            })
        }
    }
}
