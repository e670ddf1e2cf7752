//! Warehouse capability interface.
//!
//! The engine never talks to a warehouse directly; every physical operation
//! goes through the [`Adapter`] trait. A backend implements the trait once
//! and is selected at startup — the scheduler, runner, and reconciler are
//! backend-agnostic.
//!
//! The one error class with special meaning is
//! [`AdapterError::Interrupted`]: it marks an operation cancelled by an
//! interrupt and is the only adapter failure the runner propagates instead
//! of converting into an error result.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::RelationType;

/// Coordinates of a relation in the warehouse, without knowing whether it
/// exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationRef {
    pub database: String,
    pub schema: String,
    pub identifier: String,
}

impl RelationRef {
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for RelationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.identifier)
    }
}

/// An existing relation, as reported by the warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub reference: RelationRef,
    pub relation_type: RelationType,
}

impl Relation {
    #[must_use]
    pub fn new(reference: RelationRef, relation_type: RelationType) -> Self {
        Self {
            reference,
            relation_type,
        }
    }

    /// Whether this relation is the given type.
    #[must_use]
    pub fn is_type(&self, relation_type: RelationType) -> bool {
        self.relation_type == relation_type
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference)
    }
}

/// Opaque metadata returned by the warehouse for a completed operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub message: String,
    pub code: Option<String>,
    pub rows_affected: Option<i64>,
}

impl AdapterResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            rows_affected: None,
        }
    }

    #[must_use]
    pub fn with_rows_affected(mut self, rows: i64) -> Self {
        self.rows_affected = Some(rows);
        self
    }
}

/// Result of executing one SQL statement: response metadata plus result rows.
///
/// Rows are opaque to the engine; they exist so callers outside the scheduler
/// (previews, tests) can observe query output.
#[derive(Clone, Debug, Default)]
pub struct ExecuteResult {
    pub response: AdapterResponse,
    pub rows: Vec<serde_json::Value>,
}

/// Live or desired configuration of a materialized view.
///
/// `definition` is the defining query; changing it cannot be applied in
/// place. `indexes` and `extra` hold attributes the warehouse can alter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterializedViewConfig {
    pub definition: String,
    pub indexes: Vec<String>,
    pub extra: FxHashMap<String, serde_json::Value>,
}

impl MaterializedViewConfig {
    #[must_use]
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            indexes: Vec::new(),
            extra: FxHashMap::default(),
        }
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
}

/// The in-place changes needed to bring a materialized view's alterable
/// attributes in line with its declared configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedViewDelta {
    pub indexes_to_drop: Vec<String>,
    pub indexes_to_create: Vec<String>,
}

impl MaterializedViewDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes_to_drop.is_empty() && self.indexes_to_create.is_empty()
    }
}

/// Errors surfaced by a warehouse backend.
#[derive(Debug, Error, Diagnostic)]
pub enum AdapterError {
    /// A query or DDL statement failed.
    #[error("query failed: {message}")]
    #[diagnostic(code(strata::adapter::query))]
    Query { message: String },

    /// The connection to the warehouse failed or was lost.
    #[error("connection error: {0}")]
    #[diagnostic(
        code(strata::adapter::connection),
        help("Check warehouse availability and credentials.")
    )]
    Connection(String),

    /// The operation was cancelled by an interrupt.
    ///
    /// This is the one interrupt-class adapter failure: the runner propagates
    /// it unmodified instead of recording an error result for the node.
    #[error("operation interrupted")]
    #[diagnostic(code(strata::adapter::interrupted))]
    Interrupted,
}

impl AdapterError {
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the interrupt class that must cross the
    /// runner boundary unmodified.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Capability interface to a warehouse backend.
///
/// One implementation is selected at startup and shared (behind `Arc`) by
/// every worker. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Execute one compiled SQL statement.
    async fn execute(&self, sql: &str) -> Result<ExecuteResult, AdapterError>;

    /// Look up an existing relation, if any.
    async fn get_relation(&self, reference: &RelationRef)
        -> Result<Option<Relation>, AdapterError>;

    /// Cancel every connection with in-flight work. Called exactly once per
    /// interrupt, never for ordinary node failures.
    async fn cancel_all_connections(&self) -> Result<(), AdapterError>;

    /// Fetch the live configuration of a materialized view.
    async fn get_materialized_view_config(
        &self,
        relation: &Relation,
    ) -> Result<MaterializedViewConfig, AdapterError>;

    /// Alter a materialized view's alterable attributes in place.
    async fn alter_materialized_view(
        &self,
        relation: &Relation,
        delta: &MaterializedViewDelta,
    ) -> Result<AdapterResponse, AdapterError>;

    /// Replace a materialized view with a new definition (full rebuild).
    async fn replace_materialized_view(
        &self,
        relation: &RelationRef,
        definition: &str,
    ) -> Result<AdapterResponse, AdapterError>;

    /// Re-populate a materialized view's data without changing its
    /// configuration.
    async fn refresh_materialized_view(
        &self,
        relation: &Relation,
    ) -> Result<AdapterResponse, AdapterError>;
}
