//! Nodes within a workflow graph.
//!
//! A node is a unit of work identified by a type id that resolves against
//! the node registry at execution time. The engine never inspects the
//! config beyond passing it to the resolved capability.

use relay_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single step in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the graph.
    pub id: NodeId,
    /// Resolved against the node registry.
    pub type_id: String,
    /// Opaque configuration handed to the capability.
    pub config: JsonValue,
}

impl Node {
    /// Creates a node with a fresh id.
    #[must_use]
    pub fn new(type_id: impl Into<String>, config: JsonValue) -> Self {
        Self {
            id: NodeId::new(),
            type_id: type_id.into(),
            config,
        }
    }

    /// Creates a node with an explicit id.
    #[must_use]
    pub fn with_id(id: NodeId, type_id: impl Into<String>, config: JsonValue) -> Self {
        Self {
            id,
            type_id: type_id.into(),
            config,
        }
    }
}
