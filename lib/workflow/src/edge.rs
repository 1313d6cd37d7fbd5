//! Edges between workflow nodes.

use relay_core::NodeId;
use serde::{Deserialize, Serialize};

/// A directed dependency from one node to another.
///
/// The target node runs only after the source node has finished, and the
/// source node's output is part of the target node's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    /// Creates an edge from `source` to `target`.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self { source, target }
    }
}
