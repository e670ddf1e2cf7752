#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;

use strata::adapter::{Adapter, Relation, RelationRef};
use strata::compile::{CompileContext, CompileError, SqlCompiler};
use strata::config::RunConfig;
use strata::event_bus::{Event, EventBus, MemorySink};
use strata::manifest::{Manifest, ModelNode};
use strata::runner::ModelRunner;
use strata::types::{Materialization, NodeId, RelationType};

/// Deterministic compiler: the produced SQL names the node and encodes the
/// compile context so adapters and assertions can see which branch ran.
pub struct TestCompiler;

#[async_trait]
impl SqlCompiler for TestCompiler {
    async fn compile(
        &self,
        node: &ModelNode,
        context: &CompileContext,
    ) -> Result<String, CompileError> {
        let mut sql = format!("SELECT 1 -- {}", node.id);
        if context.full_refresh {
            sql.push_str(" full_refresh");
        }
        if context.incremental {
            sql.push_str(" incremental");
        }
        if let Some(window) = context.batch_window {
            sql.push_str(&format!(" window={window}"));
        }
        Ok(sql)
    }
}

/// Compiler that rejects every node.
pub struct FailingCompiler;

#[async_trait]
impl SqlCompiler for FailingCompiler {
    async fn compile(
        &self,
        node: &ModelNode,
        _context: &CompileContext,
    ) -> Result<String, CompileError> {
        Err(CompileError::failed(node.id.to_string(), "template error"))
    }
}

pub fn table(id: &str) -> ModelNode {
    ModelNode::new(id, Materialization::Table)
}

pub fn view(id: &str) -> ModelNode {
    ModelNode::new(id, Materialization::View)
}

pub fn incremental(id: &str) -> ModelNode {
    ModelNode::new(id, Materialization::Incremental)
}

pub fn ephemeral(id: &str) -> ModelNode {
    ModelNode::new(id, Materialization::Ephemeral)
}

pub fn materialized_view(id: &str) -> ModelNode {
    ModelNode::new(id, Materialization::MaterializedView)
}

pub fn manifest_from<I>(nodes: I) -> Manifest
where
    I: IntoIterator<Item = ModelNode>,
{
    let mut manifest = Manifest::new();
    for node in nodes {
        manifest.insert(node);
    }
    manifest
}

/// An existing table relation matching the default coordinates of `id`.
pub fn existing_table(id: &str) -> Relation {
    Relation::new(
        RelationRef::new("analytics", "public", id),
        RelationType::Table,
    )
}

pub fn existing_materialized_view(id: &str) -> Relation {
    Relation::new(
        RelationRef::new("analytics", "public", id),
        RelationType::MaterializedView,
    )
}

/// The SQL [`TestCompiler`] produces for a plain (non-incremental,
/// non-full-refresh) build of `id` — also the desired definition the
/// reconciler diffs against.
pub fn compiled_definition(id: &str) -> String {
    format!("SELECT 1 -- {id}")
}

/// Runner wired to the given adapter, plus the receiver its events land on.
pub fn test_runner(
    adapter: Arc<dyn Adapter>,
    config: RunConfig,
) -> (ModelRunner, flume::Receiver<Event>) {
    let (tx, rx) = flume::unbounded();
    let runner = ModelRunner::new(adapter, Arc::new(TestCompiler), config, tx);
    (runner, rx)
}

/// Event bus capturing everything in memory, plus the capture handle.
pub fn memory_bus() -> (EventBus, MemorySink) {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    (bus, sink)
}

/// Messages drained from a runner's event receiver.
pub fn drain_messages(rx: &flume::Receiver<Event>) -> Vec<String> {
    rx.try_iter().map(|e| e.message().to_string()).collect()
}

pub fn node_id(id: &str) -> NodeId {
    NodeId::from(id)
}
