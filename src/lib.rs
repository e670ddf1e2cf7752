//! # Strata: Concurrent DAG Materialization Engine
//!
//! Strata builds and executes a dependency graph of data-transformation
//! nodes ("models") against a warehouse, applying per-node materialization
//! strategies — table, view, incremental, materialized view — while tracking
//! per-run status, concurrency, and configuration drift.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Immutable declarations of one unit of work, owned by the
//!   [`manifest::Manifest`]
//! - **Graph**: Validated DAG over node ids; readiness is gated purely by
//!   dependency completion
//! - **Runner**: Per-node execution policy (full rebuild, incremental
//!   append, configuration-change reconciliation, microbatch)
//! - **Orchestrator**: Bounded worker pool pulling ready nodes, with
//!   fail-fast and interrupt handling
//! - **Events**: One result line per node plus the reconciler's verbatim
//!   decisions, fanned out to pluggable sinks
//!
//! ## Quick Start
//!
//! Declaring a small graph:
//!
//! ```
//! use strata::manifest::{Dependency, Manifest, ModelNode};
//! use strata::graph::Graph;
//! use strata::types::Materialization;
//!
//! let manifest = Manifest::new()
//!     .with_node(ModelNode::new("stg_orders", Materialization::View))
//!     .with_node(
//!         ModelNode::new("orders", Materialization::Incremental)
//!             .with_dependency(Dependency::on("stg_orders")),
//!     );
//!
//! let graph = Graph::from_manifest(&manifest).expect("acyclic");
//! assert_eq!(graph.len(), 2);
//! ```
//!
//! Running it requires an [`adapter::Adapter`] (your warehouse backend) and
//! a [`compile::SqlCompiler`] (your template engine):
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use strata::adapter::Adapter;
//! # use strata::compile::SqlCompiler;
//! use strata::config::RunConfig;
//! use strata::manifest::Manifest;
//! use strata::orchestrator::Orchestrator;
//!
//! # async fn example(
//! #     manifest: Manifest,
//! #     adapter: Arc<dyn Adapter>,
//! #     compiler: Arc<dyn SqlCompiler>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::new().with_threads(4).with_fail_fast(true);
//! let orchestrator = Orchestrator::new(manifest, adapter, compiler, config)?;
//!
//! // Wire Ctrl-C to the run before starting it.
//! orchestrator.interrupt_signal().spawn_ctrl_c_listener();
//!
//! let outcome = orchestrator.run().await?;
//! println!("{}", outcome.summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution Semantics
//!
//! - A node never starts before every required predecessor has reported
//!   completion; among equally-ready nodes dispatch order is unspecified.
//! - An ordinary node failure becomes a typed [`results::RunResult`] and
//!   skips must-succeed descendants; it never cancels siblings unless
//!   fail-fast is enabled.
//! - An interrupt cancels in-flight warehouse work (exactly one
//!   `cancel_all_connections` call) and aborts the run.
//! - Microbatch nodes fold per-window outcomes into `Success`, `Error`, or
//!   `PartialSuccess` — the last still unblocks dependents.
//!
//! ## Module Guide
//!
//! - [`types`] - Node ids, materializations, statuses
//! - [`manifest`] - Node declarations and the manifest
//! - [`graph`] - Validated DAG and the scheduling frontier
//! - [`adapter`] - Warehouse capability interface
//! - [`compile`] - Opaque SQL compilation seam
//! - [`runner`] - Per-node execution policy, reconciliation, microbatch
//! - [`orchestrator`] - Worker pool and run lifecycle
//! - [`results`] - Typed run results and summaries
//! - [`event_bus`] - Structured events and sinks
//! - [`config`] - Immutable per-run configuration

pub mod adapter;
pub mod compile;
pub mod config;
pub mod event_bus;
pub mod graph;
pub mod manifest;
pub mod orchestrator;
pub mod results;
pub mod runner;
pub mod telemetry;
pub mod types;
