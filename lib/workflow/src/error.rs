//! Error types for the workflow crate.
//!
//! The taxonomy separates synchronous rejections (`ValidationError`),
//! business outcomes (`CapabilityError`, recorded but never retried), and
//! infrastructure faults (`StoreError`, `QueueError`, retried a bounded
//! number of times by the controller).

use relay_core::{ExecutionId, NodeId};
use relay_quota::QuotaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural problems with a graph, rejected before anything persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The graph contains a cycle.
    CycleDetected,
    /// An edge references a node id that is not in the graph.
    DanglingEdge { source: NodeId, target: NodeId },
    /// A node's type id does not resolve against the registry.
    UnknownNodeType { node_id: NodeId, type_id: String },
    /// Two nodes share the same id.
    DuplicateNodeId { node_id: NodeId },
    /// The graph has no nodes.
    EmptyGraph,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "graph contains a cycle"),
            Self::DanglingEdge { source, target } => {
                write!(f, "edge {source} -> {target} references a missing node")
            }
            Self::UnknownNodeType { node_id, type_id } => {
                write!(f, "node {node_id} has unknown type '{type_id}'")
            }
            Self::DuplicateNodeId { node_id } => {
                write!(f, "duplicate node id: {node_id}")
            }
            Self::EmptyGraph => write!(f, "graph has no nodes"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failure reported by a node capability.
///
/// These are business outcomes: they are persisted as failed node results
/// and never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityError {
    /// The input did not satisfy the capability's expectations.
    InvalidInput { message: String },
    /// The operation itself failed.
    OperationFailed { message: String },
    /// A downstream provider returned an error.
    ExternalService { service: String, message: String },
    /// The capability did not finish in time.
    Timeout,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { message } => write!(f, "invalid input: {message}"),
            Self::OperationFailed { message } => write!(f, "operation failed: {message}"),
            Self::ExternalService { service, message } => {
                write!(f, "external service error ({service}): {message}")
            }
            Self::Timeout => write!(f, "capability timed out"),
        }
    }
}

impl std::error::Error for CapabilityError {}

/// Infrastructure faults from the execution ledger or workflow store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached.
    Unavailable { message: String },
    /// A record failed to serialize or deserialize.
    Serialization { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { message } => write!(f, "store unavailable: {message}"),
            Self::Serialization { message } => write!(f, "store serialization failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Infrastructure faults from the job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Failed to connect to the queue backend.
    ConnectionFailed { message: String },
    /// Failed to publish a job.
    PublishFailed { message: String },
    /// Failed to receive jobs.
    ReceiveFailed { message: String },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => write!(f, "queue connection failed: {message}"),
            Self::PublishFailed { message } => write!(f, "job publish failed: {message}"),
            Self::ReceiveFailed { message } => write!(f, "job receive failed: {message}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Errors surfaced by the execution controller.
#[derive(Debug)]
pub enum ControllerError {
    /// The graph snapshot failed validation. Nothing was persisted.
    Validation(ValidationError),
    /// The owner is over quota. Nothing was persisted.
    Quota(QuotaError),
    /// The ledger failed and retries were exhausted.
    Store {
        execution_id: ExecutionId,
        source: StoreError,
    },
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "validation failed: {e}"),
            Self::Quota(e) => write!(f, "quota rejection: {e}"),
            Self::Store {
                execution_id,
                source,
            } => write!(f, "ledger failure for execution {execution_id}: {source}"),
        }
    }
}

impl std::error::Error for ControllerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Quota(e) => Some(e),
            Self::Store { source, .. } => Some(source),
        }
    }
}

impl From<ValidationError> for ControllerError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<QuotaError> for ControllerError {
    fn from(e: QuotaError) -> Self {
        Self::Quota(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::UnknownNodeType {
            node_id: NodeId::new(),
            type_id: "missing".to_string(),
        };
        assert!(err.to_string().contains("unknown type 'missing'"));
    }

    #[test]
    fn capability_error_display() {
        let err = CapabilityError::ExternalService {
            service: "mail".to_string(),
            message: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("mail"));
        assert!(err.to_string().contains("rate limited"));
    }
}
