//! Execution ledger: durable record of execution lifecycles.
//!
//! Writes are idempotent and keyed by the pre-generated execution id.
//! `insert_running` refuses to create a second record for an id that
//! already exists, and `finish` refuses to touch a record that is already
//! terminal. Those two booleans are what make redelivered jobs safe: the
//! controller replays the recorded outcome instead of re-running, and the
//! usage increment fires only for the caller that actually flipped the
//! record to terminal.

use crate::error::StoreError;
use crate::execution::{ExecutionRecord, ExecutionStatus, LogEntry, NodeResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{ExecutionId, WorkflowId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Persistence interface for execution records, node results, and logs.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a `Running` record.
    ///
    /// Returns false (and writes nothing) if a record with this id already
    /// exists.
    async fn insert_running(&self, record: &ExecutionRecord) -> Result<bool, StoreError>;

    /// Transitions a record to a terminal status.
    ///
    /// Returns false (and writes nothing) if the record is already
    /// terminal or does not exist. This is the exactly-once latch for
    /// post-completion side effects.
    async fn finish(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        final_output: Option<JsonValue>,
        error: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Inserts a terminal `Skipped` record. A no-op if the id exists.
    async fn insert_skipped(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Appends node results for an execution.
    ///
    /// Re-appending for the same execution id replaces the previous batch,
    /// so a retried persist phase does not duplicate rows.
    async fn append_node_results(
        &self,
        id: ExecutionId,
        results: &[NodeResult],
    ) -> Result<(), StoreError>;

    /// Appends log entries for an execution, same replacement semantics as
    /// node results.
    async fn append_logs(&self, id: ExecutionId, logs: &[LogEntry]) -> Result<(), StoreError>;

    /// Reads an execution record.
    async fn get(&self, id: ExecutionId) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Reads the node results of an execution.
    async fn node_results(&self, id: ExecutionId) -> Result<Vec<NodeResult>, StoreError>;

    /// Lists all executions of a workflow, most recent first.
    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;
}

/// In-memory ledger for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    records: Arc<RwLock<HashMap<ExecutionId, ExecutionRecord>>>,
    results: Arc<RwLock<HashMap<ExecutionId, Vec<NodeResult>>>>,
    logs: Arc<RwLock<HashMap<ExecutionId, Vec<LogEntry>>>>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn insert_running(&self, record: &ExecutionRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.id) {
            return Ok(false);
        }
        records.insert(record.id, record.clone());
        Ok(true)
    }

    async fn finish(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        final_output: Option<JsonValue>,
        error: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().unwrap();
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        if record.status.is_terminal() {
            return Ok(false);
        }
        record.status = status;
        record.final_output = final_output;
        record.error = error;
        record.completed_at = Some(completed_at);
        record.duration_ms = Some(
            (completed_at - record.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        Ok(true)
    }

    async fn insert_skipped(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        records.entry(record.id).or_insert_with(|| record.clone());
        Ok(())
    }

    async fn append_node_results(
        &self,
        id: ExecutionId,
        results: &[NodeResult],
    ) -> Result<(), StoreError> {
        self.results.write().unwrap().insert(id, results.to_vec());
        Ok(())
    }

    async fn append_logs(&self, id: ExecutionId, logs: &[LogEntry]) -> Result<(), StoreError> {
        self.logs.write().unwrap().insert(id, logs.to_vec());
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self.records.read().unwrap().get(&id).cloned())
    }

    async fn node_results(&self, id: ExecutionId) -> Result<Vec<NodeResult>, StoreError> {
        Ok(self
            .results
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let mut records: Vec<ExecutionRecord> = self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }
}

impl Clone for InMemoryExecutionStore {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            results: Arc::clone(&self.results),
            logs: Arc::clone(&self.logs),
        }
    }
}
