use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adapter::AdapterResponse;
use crate::results::{RunResult, RunStatus};

/// Severity attached to an emitted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Error,
}

/// A structured event produced during a run.
///
/// Result lines are emitted once per completed node; diagnostics carry the
/// reconciler's verbatim log lines and run-level notices. Sinks receive full
/// event objects and decide how to render them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Result(ResultLineEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// The one result-line event for a completed node.
    #[must_use]
    pub fn result_line(result: &RunResult) -> Self {
        let level = if result.status.is_failure() {
            EventLevel::Error
        } else {
            EventLevel::Info
        };
        Event::Result(ResultLineEvent {
            node_id: result.node_id.to_string(),
            status: result.status,
            level,
            message: result.message.clone(),
            execution_time: result.execution_time,
            adapter_response: result.adapter_response.clone(),
        })
    }

    #[must_use]
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    #[must_use]
    pub fn scope_label(&self) -> &str {
        match self {
            Event::Result(_) => "result",
            Event::Diagnostic(diag) => &diag.scope,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Event::Result(line) => &line.message,
            Event::Diagnostic(diag) => &diag.message,
        }
    }

    #[must_use]
    pub fn level(&self) -> EventLevel {
        match self {
            Event::Result(line) => line.level,
            Event::Diagnostic(_) => EventLevel::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Result(line) => write!(
                f,
                "{} [{} in {:.2}s] {}",
                line.node_id, line.status, line.execution_time, line.message
            ),
            Event::Diagnostic(diag) => write!(f, "{}", diag.message),
        }
    }
}

/// Per-node result line: status, message, timing, and adapter metadata for
/// one completed node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResultLineEvent {
    pub node_id: String,
    pub status: RunStatus,
    pub level: EventLevel,
    pub message: String,
    pub execution_time: f64,
    pub adapter_response: AdapterResponse,
}

/// Free-form diagnostic line with a scope label.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}
