mod common;

use common::fixtures::{ephemeral, incremental, manifest_from, node_id, table};
use strata::graph::{Graph, GraphError};
use strata::manifest::{BatchConfig, BatchGranularity, Dependency};

#[test]
fn builds_and_elides_ephemeral_nodes() {
    let manifest = manifest_from([
        table("a"),
        ephemeral("e").with_dependency("a"),
        table("b").with_dependency("e"),
    ]);
    let graph = Graph::from_manifest(&manifest).unwrap();

    // The ephemeral node is not schedulable; its consumer depends on the
    // nearest executable ancestor instead.
    assert_eq!(graph.nodes(), &[node_id("a"), node_id("b")]);
    let deps = graph.dependencies(&node_id("b"), false);
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].id, node_id("a"));
    assert!(deps[0].requires_success);
}

#[test]
fn ephemeral_chains_resolve_through_multiple_hops() {
    let manifest = manifest_from([
        table("a"),
        ephemeral("e1").with_dependency("a"),
        ephemeral("e2").with_dependency("e1"),
        table("b").with_dependency("e2"),
    ]);
    let graph = Graph::from_manifest(&manifest).unwrap();
    let deps = graph.dependencies(&node_id("b"), false);
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].id, node_id("a"));
}

#[test]
fn transitive_dependencies_cover_all_ancestors() {
    let manifest = manifest_from([
        table("a"),
        table("b").with_dependency("a"),
        table("c").with_dependency("b"),
    ]);
    let graph = Graph::from_manifest(&manifest).unwrap();

    let direct: Vec<_> = graph
        .dependencies(&node_id("c"), false)
        .iter()
        .map(|d| d.id.clone())
        .collect();
    assert_eq!(direct, vec![node_id("b")]);

    let transitive: Vec<_> = graph
        .dependencies(&node_id("c"), true)
        .iter()
        .map(|d| d.id.clone())
        .collect();
    assert_eq!(transitive, vec![node_id("a"), node_id("b")]);
}

#[test]
fn transitive_gating_weakens_across_optional_links() {
    // c -> b (gating) -> a, but b's edge to a is ordering-only. a's failure
    // must not cascade past b to c through the transitive relation.
    let manifest = manifest_from([
        table("a"),
        table("b").with_dependency(Dependency::optional("a")),
        table("c").with_dependency("b"),
    ]);
    let graph = Graph::from_manifest(&manifest).unwrap();

    let transitive = graph.dependencies(&node_id("c"), true);
    let a_edge = transitive.iter().find(|d| d.id == node_id("a")).unwrap();
    assert!(!a_edge.requires_success);
    let b_edge = transitive.iter().find(|d| d.id == node_id("b")).unwrap();
    assert!(b_edge.requires_success);
}

#[test]
fn unknown_dependency_is_rejected() {
    let manifest = manifest_from([table("a").with_dependency("ghost")]);
    match Graph::from_manifest(&manifest) {
        Err(GraphError::UnknownDependency { node, dependency }) => {
            assert_eq!(node, node_id("a"));
            assert_eq!(dependency, node_id("ghost"));
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn cycles_are_rejected() {
    let manifest = manifest_from([
        table("a").with_dependency("b"),
        table("b").with_dependency("a"),
    ]);
    assert!(matches!(
        Graph::from_manifest(&manifest),
        Err(GraphError::Cycle { .. })
    ));
}

#[test]
fn self_loop_is_rejected() {
    let manifest = manifest_from([table("a").with_dependency("a")]);
    assert!(matches!(
        Graph::from_manifest(&manifest),
        Err(GraphError::Cycle { .. })
    ));
}

#[test]
fn batch_config_requires_incremental_materialization() {
    let manifest = manifest_from([
        table("t").with_batch(BatchConfig::new(BatchGranularity::Day)),
    ]);
    assert!(matches!(
        Graph::from_manifest(&manifest),
        Err(GraphError::InvalidBatchDeclaration { node }) if node == node_id("t")
    ));

    let ok = manifest_from([
        incremental("i").with_batch(BatchConfig::new(BatchGranularity::Day)),
    ]);
    assert!(Graph::from_manifest(&ok).is_ok());
}

#[test]
fn diamond_dependencies_deduplicate() {
    let manifest = manifest_from([
        table("a"),
        table("b").with_dependency("a"),
        table("c").with_dependency("a"),
        table("d").with_dependencies(["b", "c"]),
    ]);
    let graph = Graph::from_manifest(&manifest).unwrap();

    let transitive: Vec<_> = graph
        .dependencies(&node_id("d"), true)
        .iter()
        .map(|d| d.id.clone())
        .collect();
    assert_eq!(transitive, vec![node_id("a"), node_id("b"), node_id("c")]);
}
