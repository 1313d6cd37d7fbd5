//! Workflow store: the source of truth for workflow graphs.
//!
//! The engine reads graph snapshots at trigger time and never re-reads a
//! graph mid-execution; edits apply to the next execution. The scheduler
//! paths also use this store to re-verify a workflow is still active
//! before running it.

use crate::error::StoreError;
use crate::graph::{WorkflowGraph, WorkflowStatus};
use async_trait::async_trait;
use relay_core::{OwnerId, WorkflowId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read/write interface for workflow graphs.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Reads a workflow by id.
    async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowGraph>, StoreError>;

    /// Inserts or replaces a workflow.
    async fn put(&self, workflow: WorkflowGraph) -> Result<(), StoreError>;

    /// Updates a workflow's status. Returns false if the id is unknown.
    async fn set_status(&self, id: WorkflowId, status: WorkflowStatus)
        -> Result<bool, StoreError>;

    /// Lists all active workflows.
    async fn list_active(&self) -> Result<Vec<WorkflowGraph>, StoreError>;

    /// Counts an owner's active workflows, for the activation quota check.
    async fn count_active_for_owner(&self, owner_id: OwnerId) -> Result<u64, StoreError>;
}

/// In-memory workflow store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Arc<RwLock<HashMap<WorkflowId, WorkflowGraph>>>,
}

impl InMemoryWorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowGraph>, StoreError> {
        Ok(self.workflows.read().unwrap().get(&id).cloned())
    }

    async fn put(&self, workflow: WorkflowGraph) -> Result<(), StoreError> {
        self.workflows
            .write()
            .unwrap()
            .insert(workflow.id, workflow);
        Ok(())
    }

    async fn set_status(
        &self,
        id: WorkflowId,
        status: WorkflowStatus,
    ) -> Result<bool, StoreError> {
        let mut workflows = self.workflows.write().unwrap();
        match workflows.get_mut(&id) {
            Some(workflow) => {
                workflow.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_active(&self) -> Result<Vec<WorkflowGraph>, StoreError> {
        Ok(self
            .workflows
            .read()
            .unwrap()
            .values()
            .filter(|w| w.status.is_active())
            .cloned()
            .collect())
    }

    async fn count_active_for_owner(&self, owner_id: OwnerId) -> Result<u64, StoreError> {
        Ok(self
            .workflows
            .read()
            .unwrap()
            .values()
            .filter(|w| w.owner_id == owner_id && w.status.is_active())
            .count() as u64)
    }
}

impl Clone for InMemoryWorkflowStore {
    fn clone(&self) -> Self {
        Self {
            workflows: Arc::clone(&self.workflows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_and_status_update() {
        let store = InMemoryWorkflowStore::new();
        let mut workflow = WorkflowGraph::new(OwnerId::new(), "wf");
        workflow.status = WorkflowStatus::Active;
        let id = workflow.id;

        store.put(workflow).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());
        assert_eq!(store.list_active().await.unwrap().len(), 1);

        assert!(store.set_status(id, WorkflowStatus::Inactive).await.unwrap());
        assert!(store.list_active().await.unwrap().is_empty());

        assert!(!store
            .set_status(WorkflowId::new(), WorkflowStatus::Active)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn active_count_is_per_owner() {
        let store = InMemoryWorkflowStore::new();
        let owner = OwnerId::new();
        let other = OwnerId::new();

        for status in [WorkflowStatus::Active, WorkflowStatus::Draft] {
            let mut workflow = WorkflowGraph::new(owner, "wf");
            workflow.status = status;
            store.put(workflow).await.unwrap();
        }
        let mut foreign = WorkflowGraph::new(other, "wf");
        foreign.status = WorkflowStatus::Active;
        store.put(foreign).await.unwrap();

        assert_eq!(store.count_active_for_owner(owner).await.unwrap(), 1);
        assert_eq!(store.count_active_for_owner(other).await.unwrap(), 1);
    }
}
