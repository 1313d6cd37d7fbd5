//! Workflow graph model and structural validation.
//!
//! A workflow is a directed acyclic graph of nodes owned by a tenant. The
//! graph is carried as explicit node and edge lists so it serializes
//! cleanly; cycle detection builds a petgraph view on demand.

use crate::edge::Edge;
use crate::error::ValidationError;
use crate::node::Node;
use petgraph::graph::DiGraph;
use relay_core::{NodeId, OwnerId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Lifecycle state of a workflow.
///
/// `Active` is the sole gate for the scheduler paths. Manual and test runs
/// are allowed in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Inactive,
}

impl WorkflowStatus {
    /// Returns true if scheduler paths may pick this workflow up.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A tenant-owned workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub id: WorkflowId,
    pub owner_id: OwnerId,
    pub name: String,
    pub status: WorkflowStatus,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Creates an empty draft workflow.
    #[must_use]
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            owner_id,
            name: name.into(),
            status: WorkflowStatus::Draft,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Adds an edge between two existing nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint does not exist in the graph.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Result<(), ValidationError> {
        if !self.contains_node(source) {
            return Err(ValidationError::DanglingEdge { source, target });
        }
        if !self.contains_node(target) {
            return Err(ValidationError::DanglingEdge { source, target });
        }
        self.edges.push(Edge::new(source, target));
        Ok(())
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Returns true if the graph contains a node with the given id.
    #[must_use]
    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.id == node_id)
    }

    /// Nodes with no incoming edges. These receive the trigger payload.
    #[must_use]
    pub fn root_nodes(&self) -> Vec<&Node> {
        let targets: HashSet<NodeId> = self.edges.iter().map(|e| e.target).collect();
        self.nodes.iter().filter(|n| !targets.contains(&n.id)).collect()
    }

    /// Nodes with no outgoing edges. Their outputs form the final output.
    #[must_use]
    pub fn terminal_nodes(&self) -> Vec<&Node> {
        let sources: HashSet<NodeId> = self.edges.iter().map(|e| e.source).collect();
        self.nodes.iter().filter(|n| !sources.contains(&n.id)).collect()
    }

    /// Source nodes of all edges pointing at the given node.
    #[must_use]
    pub fn predecessors(&self, node_id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.target == node_id)
            .map(|e| e.source)
            .collect()
    }

    /// Validates graph structure: unique node ids, no dangling edges,
    /// no cycles. Node type resolution is checked separately against the
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate_structure(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(ValidationError::DuplicateNodeId { node_id: node.id });
            }
        }

        for edge in &self.edges {
            if !seen.contains(&edge.source) || !seen.contains(&edge.target) {
                return Err(ValidationError::DanglingEdge {
                    source: edge.source,
                    target: edge.target,
                });
            }
        }

        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let mut index = HashMap::new();
        for node in &self.nodes {
            index.insert(node.id, graph.add_node(node.id));
        }
        for edge in &self.edges {
            graph.add_edge(index[&edge.source], index[&edge.target], ());
        }
        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(ValidationError::CycleDetected);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_with_nodes(count: usize) -> (WorkflowGraph, Vec<NodeId>) {
        let mut graph = WorkflowGraph::new(OwnerId::new(), "test");
        let ids: Vec<NodeId> = (0..count)
            .map(|_| graph.add_node(Node::new("echo", json!({}))))
            .collect();
        (graph, ids)
    }

    #[test]
    fn valid_linear_graph_passes() {
        let (mut graph, ids) = graph_with_nodes(3);
        graph.add_edge(ids[0], ids[1]).unwrap();
        graph.add_edge(ids[1], ids[2]).unwrap();
        assert!(graph.validate_structure().is_ok());
    }

    #[test]
    fn cycle_is_rejected() {
        let (mut graph, ids) = graph_with_nodes(2);
        graph.add_edge(ids[0], ids[1]).unwrap();
        graph.add_edge(ids[1], ids[0]).unwrap();
        assert_eq!(graph.validate_structure(), Err(ValidationError::CycleDetected));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let (mut graph, ids) = graph_with_nodes(1);
        graph.add_edge(ids[0], ids[0]).unwrap();
        assert_eq!(graph.validate_structure(), Err(ValidationError::CycleDetected));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let (mut graph, ids) = graph_with_nodes(1);
        let ghost = NodeId::new();
        // Bypass add_edge's check to simulate a stale snapshot.
        graph.edges.push(Edge::new(ids[0], ghost));
        assert!(matches!(
            graph.validate_structure(),
            Err(ValidationError::DanglingEdge { .. })
        ));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let (mut graph, ids) = graph_with_nodes(1);
        graph
            .nodes
            .push(Node::with_id(ids[0], "echo", json!({})));
        assert!(matches!(
            graph.validate_structure(),
            Err(ValidationError::DuplicateNodeId { .. })
        ));
    }

    #[test]
    fn root_and_terminal_nodes() {
        let (mut graph, ids) = graph_with_nodes(3);
        graph.add_edge(ids[0], ids[1]).unwrap();
        graph.add_edge(ids[0], ids[2]).unwrap();

        let roots: Vec<NodeId> = graph.root_nodes().iter().map(|n| n.id).collect();
        assert_eq!(roots, vec![ids[0]]);

        let terminals: Vec<NodeId> = graph.terminal_nodes().iter().map(|n| n.id).collect();
        assert_eq!(terminals.len(), 2);
        assert!(terminals.contains(&ids[1]));
        assert!(terminals.contains(&ids[2]));
    }

    #[test]
    fn graph_serde_roundtrip() {
        let (mut graph, ids) = graph_with_nodes(2);
        graph.add_edge(ids[0], ids[1]).unwrap();

        let json = serde_json::to_string(&graph).expect("serialize");
        let parsed: WorkflowGraph = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(graph, parsed);
    }
}
