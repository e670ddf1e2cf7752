//! Core identifier and classification types for the strata engine.
//!
//! This module defines the fundamental types used throughout the system for
//! identifying nodes and classifying how their output is persisted. These are
//! the core domain concepts that define what a run *is*.
//!
//! # Key Types
//!
//! - [`NodeId`]: Unique identifier of a schedulable unit of work
//! - [`Materialization`]: The physical strategy used to persist a node's output
//! - [`RelationType`]: The kind of object a relation is in the warehouse
//! - [`OnConfigurationChange`]: Policy for handling configuration drift on
//!   stateful materializations
//!
//! # Examples
//!
//! ```rust
//! use strata::types::{Materialization, NodeId, RelationType};
//!
//! let id = NodeId::from("orders_rollup");
//! assert_eq!(id.as_str(), "orders_rollup");
//!
//! // Incremental models persist as plain tables.
//! assert_eq!(
//!     Materialization::Incremental.expected_relation_type(),
//!     Some(RelationType::Table),
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a node within the execution graph.
///
/// Node ids are opaque strings chosen by the manifest author. They are used
/// as graph keys, in result reporting, and in every emitted event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The physical strategy used to persist a node's output.
///
/// The materialization decides which execution branch the runner takes:
/// plain rebuilds for [`Table`](Self::Table)/[`View`](Self::View)/
/// [`Seed`](Self::Seed)/[`Snapshot`](Self::Snapshot), append-or-rebuild for
/// [`Incremental`](Self::Incremental), and configuration-change
/// reconciliation for [`MaterializedView`](Self::MaterializedView).
/// [`Ephemeral`](Self::Ephemeral) nodes are never executed; they are inlined
/// into their consumers and elided from the schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    Table,
    View,
    Incremental,
    MaterializedView,
    Ephemeral,
    Seed,
    Snapshot,
}

impl Materialization {
    /// The relation type this materialization produces in the warehouse, or
    /// `None` for materializations that produce no relation at all.
    #[must_use]
    pub fn expected_relation_type(&self) -> Option<RelationType> {
        match self {
            Materialization::Table
            | Materialization::Incremental
            | Materialization::Seed
            | Materialization::Snapshot => Some(RelationType::Table),
            Materialization::View => Some(RelationType::View),
            Materialization::MaterializedView => Some(RelationType::MaterializedView),
            Materialization::Ephemeral => None,
        }
    }

    /// Returns `true` if nodes of this materialization are elided from the
    /// schedule.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Materialization::Ephemeral)
    }
}

impl fmt::Display for Materialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Materialization::Table => "table",
            Materialization::View => "view",
            Materialization::Incremental => "incremental",
            Materialization::MaterializedView => "materialized_view",
            Materialization::Ephemeral => "ephemeral",
            Materialization::Seed => "seed",
            Materialization::Snapshot => "snapshot",
        };
        write!(f, "{label}")
    }
}

/// The kind of object an existing relation is in the warehouse.
///
/// Used by the runner to decide whether an existing relation is compatible
/// with a node's declared materialization (an incremental node can only
/// append to a `Table`, for example).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Table,
    View,
    MaterializedView,
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelationType::Table => "table",
            RelationType::View => "view",
            RelationType::MaterializedView => "materialized_view",
        };
        write!(f, "{label}")
    }
}

/// Policy for handling configuration drift on a materialized view.
///
/// Consulted by the reconciler when the live object's configuration differs
/// from the node's declared configuration. A full-refresh run bypasses this
/// policy entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnConfigurationChange {
    /// Apply supported changes in place; rebuild for unsupported ones.
    #[default]
    Apply,
    /// Leave the object untouched and report success.
    Skip,
    /// Leave the object untouched and report an error.
    Fail,
}

impl fmt::Display for OnConfigurationChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OnConfigurationChange::Apply => "apply",
            OnConfigurationChange::Skip => "skip",
            OnConfigurationChange::Fail => "fail",
        };
        write!(f, "{label}")
    }
}
