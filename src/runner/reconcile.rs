//! Configuration-change reconciliation for materialized views.
//!
//! A materialized view is stateful: between runs its live configuration can
//! drift from the node's declared configuration. Instead of rebuilding
//! unconditionally, the reconciler diffs desired against live and picks the
//! cheapest safe action — REFRESH when nothing changed, ALTER for supported
//! in-place changes, REPLACE when the defining query (or another
//! unsupported attribute) changed. The node's `on_configuration_change`
//! policy decides whether detected drift is applied, skipped, or failed.
//!
//! A full-refresh run bypasses reconciliation entirely and goes straight to
//! REPLACE.
//!
//! Every branch emits its decision as a verbatim log line through the event
//! bus; downstream tooling matches on these exact strings.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::adapter::{MaterializedViewConfig, MaterializedViewDelta, Relation};
use crate::compile::CompileContext;
use crate::event_bus::Event;
use crate::manifest::ModelNode;
use crate::results::RunStatus;
use crate::types::OnConfigurationChange;

use super::{effective_full_refresh, Execution, ExecutionFailure, ModelRunner};

const RECONCILE_SCOPE: &str = "reconcile";

/// Classified diff between a node's declared configuration and the live
/// object. Computed fresh per run; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigurationChange {
    NoChange,
    /// Changes the warehouse supports altering in place.
    Alter(MaterializedViewDelta),
    /// Changes that require a full rebuild, named by attribute.
    Replace(Vec<String>),
}

impl ConfigurationChange {
    /// Diff `desired` against `live`.
    ///
    /// A differing definition (or any differing `extra` attribute the node
    /// declares) forces a rebuild; index differences alone are alterable.
    /// Only attributes present in `desired.extra` are compared, so
    /// warehouse-internal values on the live object do not trigger spurious
    /// rebuilds.
    #[must_use]
    pub fn between(desired: &MaterializedViewConfig, live: &MaterializedViewConfig) -> Self {
        let mut replace_reasons: Vec<String> = Vec::new();
        if desired.definition != live.definition {
            replace_reasons.push("definition".to_string());
        }
        for (key, value) in &desired.extra {
            if live.extra.get(key) != Some(value) {
                replace_reasons.push(key.clone());
            }
        }
        if !replace_reasons.is_empty() {
            replace_reasons.sort();
            return ConfigurationChange::Replace(replace_reasons);
        }

        let delta = MaterializedViewDelta {
            indexes_to_drop: difference(&live.indexes, &desired.indexes),
            indexes_to_create: difference(&desired.indexes, &live.indexes),
        };
        if delta.is_empty() {
            ConfigurationChange::NoChange
        } else {
            ConfigurationChange::Alter(delta)
        }
    }

    #[must_use]
    pub fn is_no_change(&self) -> bool {
        matches!(self, ConfigurationChange::NoChange)
    }
}

fn difference(from: &[String], subtract: &[String]) -> Vec<String> {
    let keep: FxHashSet<&str> = subtract.iter().map(String::as_str).collect();
    let mut out: Vec<String> = from
        .iter()
        .filter(|item| !keep.contains(item.as_str()))
        .cloned()
        .collect();
    out.sort();
    out
}

pub(crate) async fn reconcile_materialized_view(
    runner: &ModelRunner,
    node: &ModelNode,
    relation: Option<Relation>,
) -> Result<Execution, ExecutionFailure> {
    let full_refresh = effective_full_refresh(node, runner.config.full_refresh);
    let reference = node.relation_ref();

    // The compiled definition is both the desired configuration and the
    // REPLACE payload.
    let context = CompileContext::full_build(full_refresh);
    let definition = runner.compiler.compile(node, &context).await?;

    let Some(relation) = relation else {
        let response = runner
            .adapter
            .replace_materialized_view(&reference, &definition)
            .await?;
        return Ok(Execution::success(
            format!("created materialized_view {reference}"),
            response,
        ));
    };

    if full_refresh {
        emit_line(runner, format!("Applying REPLACE to: {relation}"));
        let response = runner
            .adapter
            .replace_materialized_view(&reference, &definition)
            .await?;
        return Ok(Execution::success(
            format!("replaced materialized_view {relation}"),
            response,
        ));
    }

    emit_line(
        runner,
        format!("Determining configuration changes on: {relation}"),
    );
    let live = runner.adapter.get_materialized_view_config(&relation).await?;
    let desired = MaterializedViewConfig {
        definition,
        indexes: node.indexes.clone(),
        extra: FxHashMap::default(),
    };
    let change = ConfigurationChange::between(&desired, &live);

    if change.is_no_change() {
        emit_line(runner, format!("Applying REFRESH to: {relation}"));
        let response = runner.adapter.refresh_materialized_view(&relation).await?;
        return Ok(Execution::success(
            format!("refreshed materialized_view {relation}"),
            response,
        ));
    }

    match (node.on_configuration_change, change) {
        (OnConfigurationChange::Apply, ConfigurationChange::Alter(delta)) => {
            emit_line(runner, format!("Applying ALTER to: {relation}"));
            runner
                .adapter
                .alter_materialized_view(&relation, &delta)
                .await?;
            emit_line(runner, format!("Applying REFRESH to: {relation}"));
            let response = runner.adapter.refresh_materialized_view(&relation).await?;
            Ok(Execution::success(
                format!("altered materialized_view {relation}"),
                response,
            ))
        }
        // Only `Replace` can reach here; no-change already refreshed above.
        (OnConfigurationChange::Apply, _) => {
            emit_line(runner, format!("Applying REPLACE to: {relation}"));
            let response = runner
                .adapter
                .replace_materialized_view(&reference, &desired.definition)
                .await?;
            Ok(Execution::success(
                format!("replaced materialized_view {relation}"),
                response,
            ))
        }
        (OnConfigurationChange::Skip, _) => {
            let notice = format!(
                "Configuration changes were identified and `on_configuration_change` \
                 was set to `skip` for `{relation}`"
            );
            emit_line(runner, notice.clone());
            Ok(Execution::success(notice, Default::default()))
        }
        (OnConfigurationChange::Fail, _) => {
            let notice = format!(
                "Configuration changes were identified and `on_configuration_change` \
                 was set to `fail` for `{relation}`"
            );
            emit_line(runner, notice.clone());
            Ok(Execution {
                status: RunStatus::Error,
                message: notice,
                response: Default::default(),
                batch: None,
            })
        }
    }
}

fn emit_line(runner: &ModelRunner, line: String) {
    tracing::info!(scope = RECONCILE_SCOPE, "{line}");
    runner.emit(Event::diagnostic(RECONCILE_SCOPE, line));
}
