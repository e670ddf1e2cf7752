//! Validated dependency graph over manifest nodes.
//!
//! [`Graph::from_manifest`] checks the declared edges (unknown dependencies,
//! cycles, misplaced batch declarations), elides ephemeral nodes by routing
//! their consumers to the nearest executable ancestors, and precomputes the
//! transitive dependency closure. The graph itself is immutable; per-run
//! scheduling state lives in the [`GraphQueue`](queue::GraphQueue) it
//! produces.

pub mod queue;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::manifest::{Dependency, Manifest, ModelNode};
use crate::types::{Materialization, NodeId};

pub use queue::GraphQueue;

/// Structural errors detected before any node is scheduled.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node {node} depends on unknown node {dependency}")]
    #[diagnostic(
        code(strata::graph::unknown_dependency),
        help("Every dependency must name a node declared in the manifest.")
    )]
    UnknownDependency { node: NodeId, dependency: NodeId },

    #[error("dependency cycle detected involving node {node}")]
    #[diagnostic(
        code(strata::graph::cycle),
        help("Break the cycle; execution order is undefined otherwise.")
    )]
    Cycle { node: NodeId },

    #[error("node {node} declares a batch configuration but is not incremental")]
    #[diagnostic(
        code(strata::graph::invalid_batch),
        help("Time-partitioned execution requires `materialization: incremental`.")
    )]
    InvalidBatchDeclaration { node: NodeId },
}

/// Immutable DAG over executable nodes.
///
/// Ephemeral nodes are already elided: each executable node's `direct`
/// dependencies point at its nearest executable ancestors, and `transitive`
/// holds the full ancestor closure. Which relation gates scheduling is
/// chosen per run via `preserve_edges`.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Vec<NodeId>,
    direct: FxHashMap<NodeId, Vec<Dependency>>,
    transitive: FxHashMap<NodeId, Vec<Dependency>>,
}

impl Graph {
    /// Validate the manifest and build the graph.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, GraphError> {
        for node in manifest.nodes() {
            for dep in &node.depends_on {
                if !manifest.contains(&dep.id) {
                    return Err(GraphError::UnknownDependency {
                        node: node.id.clone(),
                        dependency: dep.id.clone(),
                    });
                }
            }
            if node.batch.is_some() && node.materialization != Materialization::Incremental {
                return Err(GraphError::InvalidBatchDeclaration {
                    node: node.id.clone(),
                });
            }
        }

        detect_cycles(manifest)?;

        let nodes: Vec<NodeId> = manifest
            .nodes()
            .filter(|node| !node.materialization.is_ephemeral())
            .map(|node| node.id.clone())
            .collect();

        let mut elision = EphemeralElision::new(manifest);
        let mut direct: FxHashMap<NodeId, Vec<Dependency>> = FxHashMap::default();
        for id in &nodes {
            let node = manifest.get(id).expect("executable node is in manifest");
            direct.insert(id.clone(), elision.resolve(node));
        }

        let mut transitive: FxHashMap<NodeId, Vec<Dependency>> = FxHashMap::default();
        for id in &nodes {
            let closure = ancestor_closure(id, &direct);
            transitive.insert(id.clone(), closure);
        }

        Ok(Self {
            nodes,
            direct,
            transitive,
        })
    }

    /// Executable node ids in manifest order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The dependency set gating `id` under the given edge mode.
    #[must_use]
    pub fn dependencies(&self, id: &NodeId, preserve_edges: bool) -> &[Dependency] {
        let map = if preserve_edges {
            &self.transitive
        } else {
            &self.direct
        };
        map.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Build a fresh scheduling frontier for one run.
    #[must_use]
    pub fn queue(&self, preserve_edges: bool) -> GraphQueue {
        let deps = if preserve_edges {
            &self.transitive
        } else {
            &self.direct
        };
        GraphQueue::new(&self.nodes, deps)
    }
}

/// Resolves a node's declared dependencies to executable ancestors, expanding
/// through ephemeral nodes. Gating flags AND along a path and OR across
/// paths: an ancestor reachable through any all-gating path stays gating.
struct EphemeralElision<'a> {
    manifest: &'a Manifest,
    resolved_ephemeral: FxHashMap<NodeId, Vec<Dependency>>,
}

impl<'a> EphemeralElision<'a> {
    fn new(manifest: &'a Manifest) -> Self {
        Self {
            manifest,
            resolved_ephemeral: FxHashMap::default(),
        }
    }

    fn resolve(&mut self, node: &ModelNode) -> Vec<Dependency> {
        let mut merged: FxHashMap<NodeId, bool> = FxHashMap::default();
        for dep in &node.depends_on {
            self.collect(dep, &mut merged);
        }
        into_sorted_dependencies(merged)
    }

    fn collect(&mut self, dep: &Dependency, merged: &mut FxHashMap<NodeId, bool>) {
        let Some(upstream) = self.manifest.get(&dep.id) else {
            return;
        };
        if upstream.materialization.is_ephemeral() {
            for inner in self.ephemeral_ancestors(&dep.id) {
                let gating = dep.requires_success && inner.requires_success;
                merged
                    .entry(inner.id.clone())
                    .and_modify(|flag| *flag |= gating)
                    .or_insert(gating);
            }
        } else {
            merged
                .entry(dep.id.clone())
                .and_modify(|flag| *flag |= dep.requires_success)
                .or_insert(dep.requires_success);
        }
    }

    fn ephemeral_ancestors(&mut self, id: &NodeId) -> Vec<Dependency> {
        if let Some(cached) = self.resolved_ephemeral.get(id) {
            return cached.clone();
        }
        let mut merged: FxHashMap<NodeId, bool> = FxHashMap::default();
        if let Some(node) = self.manifest.get(id) {
            let deps = node.depends_on.clone();
            for dep in &deps {
                self.collect(dep, &mut merged);
            }
        }
        let resolved = into_sorted_dependencies(merged);
        self.resolved_ephemeral.insert(id.clone(), resolved.clone());
        resolved
    }
}

fn into_sorted_dependencies(merged: FxHashMap<NodeId, bool>) -> Vec<Dependency> {
    let mut deps: Vec<Dependency> = merged
        .into_iter()
        .map(|(id, requires_success)| Dependency {
            id,
            requires_success,
        })
        .collect();
    deps.sort_by(|a, b| a.id.cmp(&b.id));
    deps
}

/// Full ancestor closure over already-elided direct dependencies.
///
/// Each node is processed at most twice: once when first reached, and once
/// more if a later path upgrades it from ordering-only to gating.
fn ancestor_closure(id: &NodeId, direct: &FxHashMap<NodeId, Vec<Dependency>>) -> Vec<Dependency> {
    let mut best: FxHashMap<NodeId, bool> = FxHashMap::default();
    let mut stack: Vec<(NodeId, bool)> = direct
        .get(id)
        .into_iter()
        .flatten()
        .map(|d| (d.id.clone(), d.requires_success))
        .collect();

    while let Some((ancestor, gating)) = stack.pop() {
        let improved = match best.get(&ancestor) {
            None => true,
            Some(&existing) => gating && !existing,
        };
        if !improved {
            continue;
        }
        best.insert(ancestor.clone(), gating);
        if let Some(parents) = direct.get(&ancestor) {
            for parent in parents {
                stack.push((parent.id.clone(), gating && parent.requires_success));
            }
        }
    }

    into_sorted_dependencies(best)
}

fn detect_cycles(manifest: &Manifest) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut marks: FxHashMap<NodeId, Mark> = FxHashMap::default();

    for root in manifest.nodes() {
        if marks.contains_key(&root.id) {
            continue;
        }
        // Iterative DFS; a back edge to an in-progress node is a cycle.
        let mut stack: Vec<(NodeId, usize)> = vec![(root.id.clone(), 0)];
        marks.insert(root.id.clone(), Mark::InProgress);

        while let Some((id, next_child)) = stack.pop() {
            let deps = manifest
                .get(&id)
                .map(|node| node.depends_on.clone())
                .unwrap_or_default();

            if next_child < deps.len() {
                stack.push((id.clone(), next_child + 1));
                let child = deps[next_child].id.clone();
                match marks.get(&child) {
                    Some(Mark::InProgress) => {
                        return Err(GraphError::Cycle { node: child });
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child.clone(), Mark::InProgress);
                        stack.push((child, 0));
                    }
                }
            } else {
                marks.insert(id, Mark::Done);
            }
        }
    }

    Ok(())
}
