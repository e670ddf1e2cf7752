//! The SQL compilation seam.
//!
//! Template rendering is out of scope for this engine: compilation happens
//! behind the [`SqlCompiler`] trait and the result is an opaque SQL string
//! handed to the adapter. The [`CompileContext`] carries the per-invocation
//! decisions the compiler needs — whether this build is a full refresh, an
//! incremental append, and which batch window it is scoped to, if any.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::manifest::ModelNode;
use crate::results::BatchWindow;

/// Per-invocation inputs to SQL compilation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompileContext {
    /// Effective full-refresh decision for this node (node config already
    /// reconciled against the global flag).
    pub full_refresh: bool,
    /// Whether the compiled statement should append to an existing relation
    /// rather than create one.
    pub incremental: bool,
    /// The time window this statement is scoped to, for microbatch nodes.
    pub batch_window: Option<BatchWindow>,
}

impl CompileContext {
    #[must_use]
    pub fn full_build(full_refresh: bool) -> Self {
        Self {
            full_refresh,
            incremental: false,
            batch_window: None,
        }
    }

    #[must_use]
    pub fn incremental_append() -> Self {
        Self {
            full_refresh: false,
            incremental: true,
            batch_window: None,
        }
    }

    #[must_use]
    pub fn with_batch_window(mut self, window: BatchWindow) -> Self {
        self.batch_window = Some(window);
        self
    }
}

/// Errors from the external compilation step.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("compilation failed for {node}: {message}")]
    #[diagnostic(
        code(strata::compile::failed),
        help("The node's template or configuration is invalid; fix it and re-run.")
    )]
    Failed { node: String, message: String },
}

impl CompileError {
    #[must_use]
    pub fn failed(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            node: node.into(),
            message: message.into(),
        }
    }
}

/// Produces the final executable SQL string for a node.
///
/// Implemented outside this crate (template engine, macro expansion, …); the
/// engine treats the output as opaque.
#[async_trait]
pub trait SqlCompiler: Send + Sync {
    async fn compile(
        &self,
        node: &ModelNode,
        context: &CompileContext,
    ) -> Result<String, CompileError>;
}
