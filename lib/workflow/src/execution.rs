//! Execution records and per-node results.
//!
//! An `ExecutionRecord` is created once per execution attempt with a
//! pre-generated id, so a redelivered job maps to the same row. Status is
//! terminal once it leaves `Running`; `Skipped` is only ever set
//! synchronously at creation, never from `Running`.

use chrono::{DateTime, Utc};
use relay_core::{ExecutionId, NodeId, NodeResultId, OwnerId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Overall status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    /// Returns true if this status never changes again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// What caused an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Polling,
    Test,
}

impl TriggerType {
    /// Returns true for the scheduler paths, which must re-verify the
    /// workflow is still active at handling time.
    #[must_use]
    pub fn requires_active_workflow(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Polling)
    }
}

/// The durable record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub owner_id: OwnerId,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    pub trigger_payload: JsonValue,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub final_output: Option<JsonValue>,
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Creates a record in `Running` state with the given pre-generated id.
    #[must_use]
    pub fn running(
        id: ExecutionId,
        workflow_id: WorkflowId,
        owner_id: OwnerId,
        trigger_type: TriggerType,
        trigger_payload: JsonValue,
    ) -> Self {
        Self {
            id,
            workflow_id,
            owner_id,
            status: ExecutionStatus::Running,
            trigger_type,
            trigger_payload,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            final_output: None,
            error: None,
        }
    }

    /// Creates a terminal `Skipped` record, used when a scheduler job
    /// fires against a workflow that is no longer active.
    #[must_use]
    pub fn skipped(
        id: ExecutionId,
        workflow_id: WorkflowId,
        owner_id: OwnerId,
        trigger_type: TriggerType,
        trigger_payload: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow_id,
            owner_id,
            status: ExecutionStatus::Skipped,
            trigger_type,
            trigger_payload,
            started_at: now,
            completed_at: Some(now),
            duration_ms: Some(0),
            final_output: None,
            error: None,
        }
    }
}

/// Status of a single node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Succeeded,
    Failed,
    /// Not executed because an upstream node failed.
    Skipped,
}

/// One row per executed (or skipped) node, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub id: NodeResultId,
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub status: NodeRunStatus,
    pub output_data: Option<JsonValue>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl NodeResult {
    /// A successful node result.
    #[must_use]
    pub fn succeeded(
        execution_id: ExecutionId,
        node_id: NodeId,
        output_data: JsonValue,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: NodeResultId::new(),
            execution_id,
            node_id,
            status: NodeRunStatus::Succeeded,
            output_data: Some(output_data),
            error: None,
            duration_ms,
        }
    }

    /// A failed node result.
    #[must_use]
    pub fn failed(
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: NodeResultId::new(),
            execution_id,
            node_id,
            status: NodeRunStatus::Failed,
            output_data: None,
            error: Some(error),
            duration_ms,
        }
    }

    /// A skipped node result for a node blocked by an upstream failure.
    #[must_use]
    pub fn skipped(execution_id: ExecutionId, node_id: NodeId) -> Self {
        Self {
            id: NodeResultId::new(),
            execution_id,
            node_id,
            status: NodeRunStatus::Skipped,
            output_data: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Diagnostic log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Append-only diagnostic trail attached to an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub execution_id: ExecutionId,
    pub node_id: Option<NodeId>,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Creates a log entry stamped with the current time.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        node_id: Option<NodeId>,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<JsonValue>,
    ) -> Self {
        Self {
            execution_id,
            node_id,
            level,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}
