#![allow(dead_code)]

use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;

use strata::adapter::{
    Adapter, AdapterError, AdapterResponse, ExecuteResult, MaterializedViewConfig,
    MaterializedViewDelta, Relation, RelationRef,
};

/// Scriptable in-memory adapter recording every operation it performs.
#[derive(Default)]
pub struct MockAdapter {
    state: Mutex<MockState>,
    cancel_calls: AtomicUsize,
    interrupt_executes: AtomicBool,
}

#[derive(Default)]
struct MockState {
    relations: FxHashMap<String, Relation>,
    mv_configs: FxHashMap<String, MaterializedViewConfig>,
    fail_markers: Vec<String>,
    operations: Vec<String>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `relation` already exists in the warehouse.
    pub fn with_relation(self, relation: Relation) -> Self {
        self.state
            .lock()
            .relations
            .insert(relation.reference.to_string(), relation);
        self
    }

    /// Live configuration returned for a materialized view.
    pub fn with_mv_config(self, reference: &RelationRef, config: MaterializedViewConfig) -> Self {
        self.state
            .lock()
            .mv_configs
            .insert(reference.to_string(), config);
        self
    }

    /// Fail any `execute` whose SQL contains `marker`.
    pub fn fail_on(self, marker: impl Into<String>) -> Self {
        self.state.lock().fail_markers.push(marker.into());
        self
    }

    /// Every `execute` fails with the interrupt class.
    pub fn interrupting(self) -> Self {
        self.interrupt_executes.store(true, Ordering::SeqCst);
        self
    }

    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn execute(&self, sql: &str) -> Result<ExecuteResult, AdapterError> {
        if self.interrupt_executes.load(Ordering::SeqCst) {
            return Err(AdapterError::Interrupted);
        }
        let mut state = self.state.lock();
        state.operations.push(format!("execute: {sql}"));
        if let Some(marker) = state.fail_markers.iter().find(|m| sql.contains(m.as_str())) {
            return Err(AdapterError::query(format!("statement matched {marker}")));
        }
        Ok(ExecuteResult {
            response: AdapterResponse::default().with_rows_affected(1),
            rows: Vec::new(),
        })
    }

    async fn get_relation(
        &self,
        reference: &RelationRef,
    ) -> Result<Option<Relation>, AdapterError> {
        Ok(self.state.lock().relations.get(&reference.to_string()).cloned())
    }

    async fn cancel_all_connections(&self) -> Result<(), AdapterError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .operations
            .push("cancel_all_connections".to_string());
        Ok(())
    }

    async fn get_materialized_view_config(
        &self,
        relation: &Relation,
    ) -> Result<MaterializedViewConfig, AdapterError> {
        Ok(self
            .state
            .lock()
            .mv_configs
            .get(&relation.reference.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn alter_materialized_view(
        &self,
        relation: &Relation,
        delta: &MaterializedViewDelta,
    ) -> Result<AdapterResponse, AdapterError> {
        self.state.lock().operations.push(format!(
            "alter: {} drop={:?} create={:?}",
            relation, delta.indexes_to_drop, delta.indexes_to_create
        ));
        Ok(AdapterResponse::new("ALTER"))
    }

    async fn replace_materialized_view(
        &self,
        relation: &RelationRef,
        _definition: &str,
    ) -> Result<AdapterResponse, AdapterError> {
        self.state
            .lock()
            .operations
            .push(format!("replace: {relation}"));
        Ok(AdapterResponse::new("REPLACE"))
    }

    async fn refresh_materialized_view(
        &self,
        relation: &Relation,
    ) -> Result<AdapterResponse, AdapterError> {
        self.state
            .lock()
            .operations
            .push(format!("refresh: {relation}"));
        Ok(AdapterResponse::new("REFRESH"))
    }
}

/// Adapter whose `execute` parks until `cancel_all_connections` is called,
/// then fails with the interrupt class. Used to exercise interrupt handling
/// with work genuinely in flight.
#[derive(Default)]
pub struct BlockingAdapter {
    cancel_calls: AtomicUsize,
    cancelled: AtomicBool,
    notify: Notify,
}

impl BlockingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for BlockingAdapter {
    async fn execute(&self, _sql: &str) -> Result<ExecuteResult, AdapterError> {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(AdapterError::Interrupted);
            }
            notified.await;
        }
    }

    async fn get_relation(
        &self,
        _reference: &RelationRef,
    ) -> Result<Option<Relation>, AdapterError> {
        Ok(None)
    }

    async fn cancel_all_connections(&self) -> Result<(), AdapterError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn get_materialized_view_config(
        &self,
        _relation: &Relation,
    ) -> Result<MaterializedViewConfig, AdapterError> {
        Ok(MaterializedViewConfig::default())
    }

    async fn alter_materialized_view(
        &self,
        _relation: &Relation,
        _delta: &MaterializedViewDelta,
    ) -> Result<AdapterResponse, AdapterError> {
        Ok(AdapterResponse::default())
    }

    async fn replace_materialized_view(
        &self,
        _relation: &RelationRef,
        _definition: &str,
    ) -> Result<AdapterResponse, AdapterError> {
        Ok(AdapterResponse::default())
    }

    async fn refresh_materialized_view(
        &self,
        _relation: &Relation,
    ) -> Result<AdapterResponse, AdapterError> {
        Ok(AdapterResponse::default())
    }
}
