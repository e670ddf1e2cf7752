//! Typed outcomes of node execution.
//!
//! A [`RunResult`] is written exactly once by the worker that executed the
//! node and is immutable afterwards; the orchestrator and reporting read it
//! without further synchronization. Microbatch nodes additionally carry
//! [`BatchResults`], the per-window success/failure ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::adapter::AdapterResponse;
use crate::types::NodeId;

/// Terminal status of one node execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    Skipped,
    /// Some but not all microbatch windows succeeded. Distinct from both
    /// `Success` and `Error`: dependents still unblock, but the run is
    /// reported as a partial failure.
    PartialSuccess,
}

impl RunStatus {
    /// Whether this status blocks must-succeed dependents.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Success => "OK",
            RunStatus::Error => "ERROR",
            RunStatus::Skipped => "SKIP",
            RunStatus::PartialSuccess => "PARTIAL SUCCESS",
        };
        write!(f, "{label}")
    }
}

/// One named timing span within a node execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingInfo {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TimingInfo {
    /// Start a span now.
    #[must_use]
    pub fn begin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Close the span now.
    #[must_use]
    pub fn complete(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    /// Span duration in seconds; zero while the span is open.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

/// A half-open `[start, end)` time window executed as one microbatch unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BatchWindow {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for BatchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Per-window ledger of a microbatch execution.
///
/// Windows appear in completion order, which under concurrent execution is
/// not necessarily chronological order. The `failed` list is retained in a
/// shape sufficient for a later retry to re-derive its work.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResults {
    pub successful: Vec<BatchWindow>,
    pub failed: Vec<BatchWindow>,
}

impl BatchResults {
    pub fn record_success(&mut self, window: BatchWindow) {
        self.successful.push(window);
    }

    pub fn record_failure(&mut self, window: BatchWindow) {
        self.failed.push(window);
    }

    pub fn extend(&mut self, other: BatchResults) {
        self.successful.extend(other.successful);
        self.failed.extend(other.failed);
    }
}

/// Outcome of executing one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub node_id: NodeId,
    pub status: RunStatus,
    pub timing: Vec<TimingInfo>,
    /// Total execution time in seconds.
    pub execution_time: f64,
    pub adapter_response: AdapterResponse,
    pub message: String,
    /// Number of failed units (failed microbatch windows, or 1 for a plain
    /// error).
    pub failures: Option<u64>,
    pub batch_results: Option<BatchResults>,
}

impl RunResult {
    #[must_use]
    pub fn success(
        node_id: NodeId,
        message: impl Into<String>,
        adapter_response: AdapterResponse,
        timing: Vec<TimingInfo>,
    ) -> Self {
        let execution_time = total_elapsed(&timing);
        Self {
            node_id,
            status: RunStatus::Success,
            timing,
            execution_time,
            adapter_response,
            message: message.into(),
            failures: Some(0),
            batch_results: None,
        }
    }

    #[must_use]
    pub fn error(node_id: NodeId, message: impl Into<String>, timing: Vec<TimingInfo>) -> Self {
        let execution_time = total_elapsed(&timing);
        Self {
            node_id,
            status: RunStatus::Error,
            timing,
            execution_time,
            adapter_response: AdapterResponse::default(),
            message: message.into(),
            failures: Some(1),
            batch_results: None,
        }
    }

    /// Result for a node skipped because a must-succeed ancestor failed.
    #[must_use]
    pub fn skipped_upstream_failure(node_id: NodeId, failed_upstream: &NodeId) -> Self {
        Self::skipped(
            node_id,
            format!("depends on a node that failed: {failed_upstream}"),
        )
    }

    /// Result for a node never started because fail-fast stopped the run.
    #[must_use]
    pub fn skipped_fail_fast(node_id: NodeId) -> Self {
        Self::skipped(node_id, "skipped because an earlier node failed")
    }

    #[must_use]
    pub fn skipped(node_id: NodeId, message: impl Into<String>) -> Self {
        Self {
            node_id,
            status: RunStatus::Skipped,
            timing: Vec::new(),
            execution_time: 0.0,
            adapter_response: AdapterResponse::default(),
            message: message.into(),
            failures: None,
            batch_results: None,
        }
    }

    #[must_use]
    pub fn with_batch_results(mut self, batch_results: BatchResults, failures: u64) -> Self {
        self.batch_results = Some(batch_results);
        self.failures = Some(failures);
        self
    }
}

fn total_elapsed(timing: &[TimingInfo]) -> f64 {
    timing.iter().map(TimingInfo::elapsed_secs).sum()
}

/// Aggregate counts for one invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub errored: usize,
    pub skipped: usize,
    pub partial: usize,
    /// Wall-clock seconds for the whole invocation.
    pub elapsed: f64,
}

impl RunSummary {
    #[must_use]
    pub fn from_results(results: &[RunResult], elapsed: f64) -> Self {
        let mut summary = Self {
            total: results.len(),
            elapsed,
            ..Self::default()
        };
        for result in results {
            match result.status {
                RunStatus::Success => summary.succeeded += 1,
                RunStatus::Error => summary.errored += 1,
                RunStatus::Skipped => summary.skipped += 1,
                RunStatus::PartialSuccess => summary.partial += 1,
            }
        }
        summary
    }

    /// Whether the invocation completed without node errors.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errored == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PASS={} ERROR={} SKIP={} PARTIAL={} TOTAL={}",
            self.succeeded, self.errored, self.skipped, self.partial, self.total
        )
    }
}
