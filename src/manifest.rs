//! Node declarations and the manifest that owns them.
//!
//! A [`ModelNode`] is the immutable declaration of one unit of work: its
//! materialization, upstream dependencies, target relation coordinates, and
//! optional time-partitioning. The [`Manifest`] owns all nodes for a run and
//! is the input to graph construction.
//!
//! Nodes are built with a fluent API:
//!
//! ```rust
//! use strata::manifest::{Dependency, Manifest, ModelNode};
//! use strata::types::Materialization;
//!
//! let manifest = Manifest::new()
//!     .with_node(ModelNode::new("stg_orders", Materialization::View))
//!     .with_node(
//!         ModelNode::new("orders", Materialization::Incremental)
//!             .with_dependency(Dependency::on("stg_orders")),
//!     );
//! assert_eq!(manifest.len(), 2);
//! ```

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::adapter::RelationRef;
use crate::types::{Materialization, NodeId, OnConfigurationChange};

/// An edge from a node to one of its upstream dependencies.
///
/// `requires_success` marks the edge as gating: if the upstream node errors,
/// this node (and its own must-succeed descendants) are skipped instead of
/// executed. Nearly every edge is gating; [`Dependency::optional`] exists for
/// the rare edge that only constrains ordering.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub id: NodeId,
    pub requires_success: bool,
}

impl Dependency {
    /// A gating dependency: the upstream node must succeed.
    #[must_use]
    pub fn on(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            requires_success: true,
        }
    }

    /// An ordering-only dependency: the upstream node must complete, but its
    /// failure does not skip this node.
    #[must_use]
    pub fn optional(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            requires_success: false,
        }
    }
}

impl From<&str> for Dependency {
    fn from(id: &str) -> Self {
        Self::on(id)
    }
}

/// Granularity of microbatch time windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchGranularity {
    Hour,
    Day,
    Month,
}

impl BatchGranularity {
    /// Truncate `ts` down to the start of its window.
    #[must_use]
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BatchGranularity::Hour => {
                let secs = ts.timestamp();
                let floored = secs - secs.rem_euclid(3600);
                DateTime::<Utc>::from_timestamp(floored, 0).expect("floored timestamp in range")
            }
            BatchGranularity::Day => {
                let secs = ts.timestamp();
                let floored = secs - secs.rem_euclid(86_400);
                DateTime::<Utc>::from_timestamp(floored, 0).expect("floored timestamp in range")
            }
            BatchGranularity::Month => Utc
                .with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
                .single()
                .expect("first of month is a valid timestamp"),
        }
    }

    /// Step `ts` back by exactly one window.
    #[must_use]
    pub fn retreat(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BatchGranularity::Hour => ts - Duration::hours(1),
            BatchGranularity::Day => ts - Duration::days(1),
            BatchGranularity::Month => {
                let (year, month) = if ts.month() == 1 {
                    (ts.year() - 1, 12)
                } else {
                    (ts.year(), ts.month() - 1)
                };
                Utc.with_ymd_and_hms(year, month, ts.day().min(28), ts.hour(), 0, 0)
                    .single()
                    .expect("retreated month is a valid timestamp")
            }
        }
    }

    /// Advance `ts` by exactly one window.
    #[must_use]
    pub fn advance(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BatchGranularity::Hour => ts + Duration::hours(1),
            BatchGranularity::Day => ts + Duration::days(1),
            BatchGranularity::Month => {
                let (year, month) = if ts.month() == 12 {
                    (ts.year() + 1, 1)
                } else {
                    (ts.year(), ts.month() + 1)
                };
                Utc.with_ymd_and_hms(year, month, ts.day().min(28), ts.hour(), 0, 0)
                    .single()
                    .expect("advanced month is a valid timestamp")
            }
        }
    }
}

/// Time-partitioning declaration for a microbatch node.
///
/// A node carrying a `BatchConfig` executes as a sequence of disjoint
/// half-open time windows instead of one statement. `begin` bounds the first
/// full backfill; `lookback` controls how many recent windows an incremental
/// run reprocesses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub granularity: BatchGranularity,
    /// Start of the earliest window for a full build. When `None`, a full
    /// build covers only the `lookback` windows.
    pub begin: Option<DateTime<Utc>>,
    /// Number of recent windows an incremental run reprocesses.
    pub lookback: u32,
    /// Whether windows after the first may execute concurrently.
    pub concurrent: bool,
}

impl BatchConfig {
    #[must_use]
    pub fn new(granularity: BatchGranularity) -> Self {
        Self {
            granularity,
            begin: None,
            lookback: 1,
            concurrent: false,
        }
    }

    #[must_use]
    pub fn with_begin(mut self, begin: DateTime<Utc>) -> Self {
        self.begin = Some(begin);
        self
    }

    #[must_use]
    pub fn with_lookback(mut self, lookback: u32) -> Self {
        self.lookback = lookback;
        self
    }

    #[must_use]
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }
}

/// Immutable declaration of one unit of work.
///
/// Built once by the manifest layer; the engine never mutates a node. The
/// target relation coordinates default to `analytics.public.<id>` and can be
/// overridden with [`with_relation`](Self::with_relation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelNode {
    pub id: NodeId,
    pub materialization: Materialization,
    pub depends_on: Vec<Dependency>,
    pub database: String,
    pub schema: String,
    pub identifier: String,
    /// Node-level full-refresh override. Takes precedence over the global
    /// flag in both directions; the flag decides only when this is `None`.
    pub full_refresh: Option<bool>,
    pub on_configuration_change: OnConfigurationChange,
    /// Declared indexes for materialized views; part of the desired
    /// configuration the reconciler diffs against the live object.
    pub indexes: Vec<String>,
    pub batch: Option<BatchConfig>,
}

impl ModelNode {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, materialization: Materialization) -> Self {
        let id = id.into();
        let identifier = id.to_string();
        Self {
            id,
            materialization,
            depends_on: Vec::new(),
            database: "analytics".to_string(),
            schema: "public".to_string(),
            identifier,
            full_refresh: None,
            on_configuration_change: OnConfigurationChange::default(),
            indexes: Vec::new(),
            batch: None,
        }
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<Dependency>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    #[must_use]
    pub fn with_dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dependency>,
    {
        self.depends_on.extend(dependencies.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_relation(
        mut self,
        database: impl Into<String>,
        schema: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        self.database = database.into();
        self.schema = schema.into();
        self.identifier = identifier.into();
        self
    }

    #[must_use]
    pub fn with_full_refresh(mut self, full_refresh: Option<bool>) -> Self {
        self.full_refresh = full_refresh;
        self
    }

    #[must_use]
    pub fn with_on_configuration_change(mut self, policy: OnConfigurationChange) -> Self {
        self.on_configuration_change = policy;
        self
    }

    #[must_use]
    pub fn with_indexes<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes = indexes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Coordinates of the relation this node materializes into.
    #[must_use]
    pub fn relation_ref(&self) -> RelationRef {
        RelationRef::new(&self.database, &self.schema, &self.identifier)
    }
}

/// All node declarations for one run, keyed by id.
///
/// Insertion order is preserved so graph construction and reporting are
/// deterministic for a given manifest.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    nodes: FxHashMap<NodeId, ModelNode>,
    order: Vec<NodeId>,
}

impl Manifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing any previous declaration with the same id.
    #[must_use]
    pub fn with_node(mut self, node: ModelNode) -> Self {
        self.insert(node);
        self
    }

    pub fn insert(&mut self, node: ModelNode) {
        let id = node.id.clone();
        if self.nodes.insert(id.clone(), node).is_none() {
            self.order.push(id);
        }
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&ModelNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ModelNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
