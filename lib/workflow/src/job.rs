//! Execution jobs and the queue they travel on.
//!
//! A job carries a full graph snapshot, so the handler never needs the
//! workflow store to run it (it only re-reads the store to re-verify
//! active status for scheduler-triggered jobs). The execution id is
//! generated by whoever enqueues, making redelivery idempotent end to end.

use crate::edge::Edge;
use crate::envelope::Envelope;
use crate::error::QueueError;
use crate::execution::TriggerType;
use crate::graph::WorkflowGraph;
use crate::node::Node;
use async_trait::async_trait;
use relay_core::{ExecutionId, OwnerId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A request to execute one workflow graph snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteWorkflowJob {
    /// Pre-generated; doubles as the idempotency key.
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub owner_id: OwnerId,
    pub plan_id: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub trigger_type: TriggerType,
    pub trigger_payload: JsonValue,
}

impl ExecuteWorkflowJob {
    /// Builds a job from a graph snapshot, generating a fresh execution id.
    #[must_use]
    pub fn from_snapshot(
        workflow: &WorkflowGraph,
        plan_id: impl Into<String>,
        trigger_type: TriggerType,
        trigger_payload: JsonValue,
    ) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            workflow_id: workflow.id,
            owner_id: workflow.owner_id,
            plan_id: plan_id.into(),
            nodes: workflow.nodes.clone(),
            edges: workflow.edges.clone(),
            trigger_type,
            trigger_payload,
        }
    }

    /// Reassembles the graph snapshot carried by this job.
    #[must_use]
    pub fn snapshot(&self) -> WorkflowGraph {
        WorkflowGraph {
            id: self.workflow_id,
            owner_id: self.owner_id,
            name: String::new(),
            status: crate::graph::WorkflowStatus::Active,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

/// Transport for execution jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publishes a job for a handler to pick up.
    async fn enqueue(&self, job: Envelope<ExecuteWorkflowJob>) -> Result<(), QueueError>;
}

/// In-memory queue over a tokio channel, for tests and single-process use.
pub struct InMemoryJobQueue {
    sender: mpsc::UnboundedSender<Envelope<ExecuteWorkflowJob>>,
    receiver: Mutex<mpsc::UnboundedReceiver<Envelope<ExecuteWorkflowJob>>>,
}

impl InMemoryJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Takes the next queued job without waiting, if one is present.
    #[must_use]
    pub fn try_recv(&self) -> Option<Envelope<ExecuteWorkflowJob>> {
        self.receiver.lock().unwrap().try_recv().ok()
    }

    /// Drains every queued job.
    #[must_use]
    pub fn drain(&self) -> Vec<Envelope<ExecuteWorkflowJob>> {
        let mut receiver = self.receiver.lock().unwrap();
        let mut jobs = Vec::new();
        while let Ok(job) = receiver.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Envelope<ExecuteWorkflowJob>) -> Result<(), QueueError> {
        self.sender
            .send(job)
            .map_err(|e| QueueError::PublishFailed {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_and_receive() {
        let queue = InMemoryJobQueue::new();
        let workflow = WorkflowGraph::new(OwnerId::new(), "wf");
        let job = ExecuteWorkflowJob::from_snapshot(
            &workflow,
            "free",
            TriggerType::Manual,
            json!({"k": "v"}),
        );

        queue.enqueue(Envelope::new(job.clone())).await.unwrap();

        let received = queue.try_recv().expect("job queued");
        assert_eq!(received.payload, job);
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn snapshot_roundtrip_preserves_nodes_and_edges() {
        let mut workflow = WorkflowGraph::new(OwnerId::new(), "wf");
        let a = workflow.add_node(Node::new("echo", json!({})));
        let b = workflow.add_node(Node::new("echo", json!({})));
        workflow.add_edge(a, b).unwrap();

        let job =
            ExecuteWorkflowJob::from_snapshot(&workflow, "pro", TriggerType::Test, json!({}));
        let snapshot = job.snapshot();

        assert_eq!(snapshot.id, workflow.id);
        assert_eq!(snapshot.nodes, workflow.nodes);
        assert_eq!(snapshot.edges, workflow.edges);
    }

    #[test]
    fn job_serde_roundtrip() {
        let workflow = WorkflowGraph::new(OwnerId::new(), "wf");
        let job = ExecuteWorkflowJob::from_snapshot(
            &workflow,
            "free",
            TriggerType::Scheduled,
            json!(null),
        );
        let bytes = Envelope::new(job.clone()).to_json_bytes().expect("serialize");
        let parsed: Envelope<ExecuteWorkflowJob> =
            Envelope::from_json_bytes(&bytes).expect("deserialize");
        assert_eq!(parsed.payload, job);
    }
}
