mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::adapters::{BlockingAdapter, MockAdapter};
use common::fixtures::{
    existing_table, incremental, manifest_from, memory_bus, node_id, table, TestCompiler,
};
use strata::config::RunConfig;
use strata::event_bus::{Event, EventLevel};
use strata::manifest::{BatchConfig, BatchGranularity, Manifest};
use strata::orchestrator::{Orchestrator, OrchestratorError};
use strata::results::RunStatus;
use strata::types::NodeId;

fn diamond() -> Manifest {
    manifest_from([
        table("a"),
        table("b").with_dependency("a"),
        table("c").with_dependency("a"),
        table("d").with_dependencies(["b", "c"]),
    ])
}

fn orchestrator(manifest: Manifest, adapter: Arc<MockAdapter>, config: RunConfig) -> Orchestrator {
    Orchestrator::new(manifest, adapter, Arc::new(TestCompiler), config).unwrap()
}

fn status_of(outcome: &strata::orchestrator::RunOutcome, id: &str) -> RunStatus {
    outcome
        .results
        .iter()
        .find(|r| r.node_id == node_id(id))
        .unwrap_or_else(|| panic!("no result for {id}"))
        .status
}

#[tokio::test]
async fn runs_every_node_in_dependency_order() {
    let adapter = Arc::new(MockAdapter::new());
    let orch = orchestrator(diamond(), adapter.clone(), RunConfig::new().with_threads(4));

    let outcome = orch.run().await.unwrap();

    assert_eq!(outcome.results.len(), 4);
    assert!(outcome.summary.success());
    assert_eq!(outcome.summary.succeeded, 4);

    // Dependency order is visible in the adapter's execute log.
    let ops = adapter.operations();
    let position = |needle: &str| {
        ops.iter()
            .position(|op| op.contains(needle))
            .unwrap_or_else(|| panic!("missing {needle}"))
    };
    assert!(position("-- a") < position("-- b"));
    assert!(position("-- a") < position("-- c"));
    assert!(position("-- b") < position("-- d"));
    assert!(position("-- c") < position("-- d"));
}

#[tokio::test]
async fn results_are_identical_across_worker_counts() {
    for threads in 1..=4 {
        let adapter = Arc::new(MockAdapter::new().fail_on("-- b"));
        let orch = orchestrator(
            diamond(),
            adapter,
            RunConfig::new().with_threads(threads),
        );
        let outcome = orch.run().await.unwrap();

        assert_eq!(outcome.results.len(), 4, "threads={threads}");
        let ids: HashSet<NodeId> = outcome.results.iter().map(|r| r.node_id.clone()).collect();
        assert_eq!(ids.len(), 4, "every node exactly once, threads={threads}");
        assert_eq!(status_of(&outcome, "a"), RunStatus::Success);
        assert_eq!(status_of(&outcome, "b"), RunStatus::Error);
        assert_eq!(status_of(&outcome, "c"), RunStatus::Success);
        assert_eq!(status_of(&outcome, "d"), RunStatus::Skipped);
    }
}

#[tokio::test]
async fn upstream_failure_skips_descendants() {
    let adapter = Arc::new(MockAdapter::new().fail_on("-- a"));
    let orch = orchestrator(diamond(), adapter.clone(), RunConfig::new().with_threads(2));

    let outcome = orch.run().await.unwrap();

    assert_eq!(status_of(&outcome, "a"), RunStatus::Error);
    for id in ["b", "c", "d"] {
        let result = outcome
            .results
            .iter()
            .find(|r| r.node_id == node_id(id))
            .unwrap();
        assert_eq!(result.status, RunStatus::Skipped, "{id}");
        assert!(result.message.contains("depends on a node that failed"));
    }

    // The descendants never reached the warehouse.
    let ops = adapter.operations();
    assert!(!ops.iter().any(|op| op.contains("-- b")));
    assert!(!ops.iter().any(|op| op.contains("-- d")));
}

#[tokio::test]
async fn fail_fast_skips_unstarted_branches() {
    // Two independent roots; with one worker the failing root runs first
    // and fail-fast drains the other before it starts.
    let manifest = manifest_from([table("f"), table("h")]);
    let adapter = Arc::new(MockAdapter::new().fail_on("-- f"));
    let orch = orchestrator(
        manifest,
        adapter.clone(),
        RunConfig::new().with_threads(1).with_fail_fast(true),
    );

    let outcome = orch.run().await.unwrap();

    assert_eq!(status_of(&outcome, "f"), RunStatus::Error);
    assert_eq!(status_of(&outcome, "h"), RunStatus::Skipped);
    assert!(!adapter.operations().iter().any(|op| op.contains("-- h")));
}

#[tokio::test]
async fn without_fail_fast_independent_branches_run() {
    let manifest = manifest_from([table("f"), table("h")]);
    let adapter = Arc::new(MockAdapter::new().fail_on("-- f"));
    let orch = orchestrator(manifest, adapter, RunConfig::new().with_threads(1));

    let outcome = orch.run().await.unwrap();

    assert_eq!(status_of(&outcome, "f"), RunStatus::Error);
    assert_eq!(status_of(&outcome, "h"), RunStatus::Success);
}

#[tokio::test]
async fn partial_success_unblocks_dependents() {
    // The microbatch node bootstraps successfully, then every append window
    // fails: a mixed outcome. Its dependent must still run.
    let manifest = manifest_from([
        incremental("m").with_batch(
            BatchConfig::new(BatchGranularity::Day).with_begin(Utc::now() - chrono::Duration::days(2)),
        ),
        table("t").with_dependency("m"),
    ]);
    let adapter = Arc::new(MockAdapter::new().fail_on("incremental"));
    let orch = orchestrator(manifest, adapter, RunConfig::new().with_threads(2));

    let outcome = orch.run().await.unwrap();

    assert_eq!(status_of(&outcome, "m"), RunStatus::PartialSuccess);
    assert_eq!(status_of(&outcome, "t"), RunStatus::Success);
    assert_eq!(outcome.summary.partial, 1);
}

#[tokio::test]
async fn emits_result_lines_at_matching_levels() {
    let (bus, sink) = memory_bus();
    let manifest = manifest_from([table("ok_node"), table("bad_node")]);
    let adapter = Arc::new(MockAdapter::new().fail_on("-- bad_node"));
    let orch = Orchestrator::with_bus(
        manifest,
        adapter,
        Arc::new(TestCompiler),
        RunConfig::new().with_threads(1),
        bus,
    )
    .unwrap();

    orch.run().await.unwrap();

    let events = sink.snapshot();
    let result_lines: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Result(line) => Some(line),
            Event::Diagnostic(_) => None,
        })
        .collect();
    assert_eq!(result_lines.len(), 2);

    let ok_line = result_lines
        .iter()
        .find(|l| l.node_id == "ok_node")
        .unwrap();
    assert_eq!(ok_line.level, EventLevel::Info);
    assert_eq!(ok_line.status, RunStatus::Success);

    let bad_line = result_lines
        .iter()
        .find(|l| l.node_id == "bad_node")
        .unwrap();
    assert_eq!(bad_line.level, EventLevel::Error);
    assert_eq!(bad_line.status, RunStatus::Error);

    // The run-level summary line is a diagnostic.
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Diagnostic(d) if d.message.starts_with("Finished running"))));
}

#[tokio::test]
async fn full_refresh_flag_reaches_every_runner() {
    let manifest = manifest_from([incremental("inc")]);
    let adapter = Arc::new(MockAdapter::new().with_relation(existing_table("inc")));
    let orch = orchestrator(
        manifest,
        adapter.clone(),
        RunConfig::new().with_threads(1).with_full_refresh(true),
    );

    orch.run().await.unwrap();

    let ops = adapter.operations();
    assert!(ops.iter().any(|op| op.contains("full_refresh")));
    assert!(!ops.iter().any(|op| op.contains("incremental")));
}

#[tokio::test]
async fn interrupt_cancels_connections_exactly_once() {
    let manifest = manifest_from([table("slow_a"), table("slow_b")]);
    let adapter = Arc::new(BlockingAdapter::new());
    let orch = Orchestrator::new(
        manifest,
        adapter.clone(),
        Arc::new(TestCompiler),
        RunConfig::new().with_threads(2),
    )
    .unwrap();

    let signal = orch.interrupt_signal();
    let trigger = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.trigger();
    };

    let (run_outcome, ()) = tokio::join!(orch.run(), trigger);

    assert!(matches!(run_outcome, Err(OrchestratorError::Interrupted)));
    assert_eq!(adapter.cancel_count(), 1);
}

#[tokio::test]
async fn node_error_does_not_cancel_connections() {
    let adapter = Arc::new(MockAdapter::new().fail_on("-- a"));
    let orch = orchestrator(diamond(), adapter.clone(), RunConfig::new().with_threads(2));

    orch.run().await.unwrap();

    assert_eq!(adapter.cancel_count(), 0);
}

#[tokio::test]
async fn summary_counts_match_results() {
    let adapter = Arc::new(MockAdapter::new().fail_on("-- b"));
    let orch = orchestrator(diamond(), adapter, RunConfig::new().with_threads(2));

    let outcome = orch.run().await.unwrap();

    assert_eq!(outcome.summary.total, 4);
    assert_eq!(outcome.summary.succeeded, 2);
    assert_eq!(outcome.summary.errored, 1);
    assert_eq!(outcome.summary.skipped, 1);
    assert!(!outcome.summary.success());
    assert!(outcome.summary.elapsed >= 0.0);
    assert!(!outcome.invocation_id.is_empty());
}

#[tokio::test]
async fn ephemeral_nodes_never_execute() {
    let manifest = manifest_from([
        table("src"),
        common::fixtures::ephemeral("mid").with_dependency("src"),
        table("out").with_dependency("mid"),
    ]);
    let adapter = Arc::new(MockAdapter::new());
    let orch = orchestrator(manifest, adapter.clone(), RunConfig::new().with_threads(2));

    let outcome = orch.run().await.unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert!(!adapter.operations().iter().any(|op| op.contains("-- mid")));
    let ops = adapter.operations();
    let src_pos = ops.iter().position(|op| op.contains("-- src")).unwrap();
    let out_pos = ops.iter().position(|op| op.contains("-- out")).unwrap();
    assert!(src_pos < out_pos);
}
