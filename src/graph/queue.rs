//! Thread-safe scheduling frontier over the dependency graph.
//!
//! Workers pull ready nodes with [`GraphQueue::get_ready`] and report
//! completions with [`GraphQueue::mark_done`]. Readiness is enforced purely
//! by in-degree gating: a node becomes eligible the moment its last gating
//! dependency reports completion, never earlier. All scheduling state is
//! mutated under a single mutex so the decrement-check-insert sequence is
//! atomic; parked workers are woken through a [`Notify`] registered before
//! the state check, so completions cannot be lost between check and park.

use std::collections::VecDeque;
use std::pin::pin;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Notify;

use crate::manifest::Dependency;
use crate::types::NodeId;

/// Frontier over a DAG: yields nodes whose dependencies have completed.
///
/// One queue serves one run. Multiple workers may call
/// [`get_ready`](Self::get_ready) and [`mark_done`](Self::mark_done)
/// concurrently.
pub struct GraphQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

struct QueueState {
    /// Nodes not yet finished (waiting, ready, or dispatched).
    pending: FxHashSet<NodeId>,
    /// Nodes handed to a worker and not yet marked done.
    dispatched: FxHashSet<NodeId>,
    /// Remaining incomplete gating/ordering dependencies per node.
    in_degree: FxHashMap<NodeId, usize>,
    /// Forward edges: node -> (dependent, requires_success).
    successors: FxHashMap<NodeId, Vec<(NodeId, bool)>>,
    ready: VecDeque<NodeId>,
    closed: bool,
}

impl GraphQueue {
    pub(crate) fn new(nodes: &[NodeId], deps: &FxHashMap<NodeId, Vec<Dependency>>) -> Self {
        let mut in_degree: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut successors: FxHashMap<NodeId, Vec<(NodeId, bool)>> = FxHashMap::default();
        let mut ready = VecDeque::new();

        for id in nodes {
            let node_deps = deps.get(id).map(Vec::as_slice).unwrap_or(&[]);
            in_degree.insert(id.clone(), node_deps.len());
            for dep in node_deps {
                successors
                    .entry(dep.id.clone())
                    .or_default()
                    .push((id.clone(), dep.requires_success));
            }
            if node_deps.is_empty() {
                ready.push_back(id.clone());
            }
        }

        Self {
            state: Mutex::new(QueueState {
                pending: nodes.iter().cloned().collect(),
                dispatched: FxHashSet::default(),
                in_degree,
                successors,
                ready,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Next ready node, parking until one becomes eligible.
    ///
    /// Returns `None` once every node has been accounted for (or the queue
    /// was closed by an interrupt).
    pub async fn get_ready(&self) -> Option<NodeId> {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register interest before checking state so a completion that
            // lands between the check and the await still wakes us.
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(id) = state.ready.pop_front() {
                    state.dispatched.insert(id.clone());
                    return Some(id);
                }
                if state.pending.is_empty() {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Record a node's completion and unblock (or cascade-skip) dependents.
    ///
    /// Returns the nodes transitively skipped because this node failed and
    /// their edge requires success; the caller records results for them.
    /// They are already marked done and will never be yielded.
    pub fn mark_done(&self, id: &NodeId, succeeded: bool) -> Vec<NodeId> {
        let mut skipped = Vec::new();
        {
            let mut state = self.state.lock();
            state.dispatched.remove(id);
            state.finish(id, succeeded, &mut skipped);
        }
        self.notify.notify_waiters();
        skipped
    }

    /// Remove every node that has not been handed to a worker yet.
    ///
    /// Used by fail-fast: in-flight nodes finish normally, everything else is
    /// returned (sorted) so the caller can record skip results.
    pub fn drain_pending(&self) -> Vec<NodeId> {
        let mut drained: Vec<NodeId> = {
            let mut state = self.state.lock();
            let waiting: Vec<NodeId> = state
                .pending
                .iter()
                .filter(|id| !state.dispatched.contains(*id))
                .cloned()
                .collect();
            for id in &waiting {
                state.pending.remove(id);
            }
            state.ready.clear();
            waiting
        };
        self.notify.notify_waiters();
        drained.sort();
        drained
    }

    /// Close the queue: parked and future `get_ready` calls return `None`
    /// immediately. In-flight nodes may still be marked done.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.ready.clear();
        }
        self.notify.notify_waiters();
    }

    /// Number of nodes not yet finished.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl QueueState {
    fn finish(&mut self, id: &NodeId, succeeded: bool, skipped: &mut Vec<NodeId>) {
        if !self.pending.remove(id) {
            return;
        }
        let successors = self.successors.get(id).cloned().unwrap_or_default();
        for (succ, requires_success) in successors {
            if !self.pending.contains(&succ) {
                continue;
            }
            let Some(degree) = self.in_degree.get_mut(&succ) else {
                continue;
            };
            *degree = degree.saturating_sub(1);
            let now_ready = *degree == 0;

            if !succeeded && requires_success {
                // The dependent can never run; mark it done and cascade so
                // its own descendants are resolved in the same pass.
                self.ready.retain(|n| *n != succ);
                skipped.push(succ.clone());
                self.finish(&succ, false, skipped);
            } else if now_ready {
                self.ready.push_back(succ);
            }
        }
    }
}
