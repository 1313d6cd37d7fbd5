//! Dependency tracking for a single execution.
//!
//! The executor drives a shrinking work graph: finished nodes are removed,
//! failed nodes are pinned with a self-edge so they never become ready and
//! keep their descendants blocked, and a node with zero incoming edges is
//! ready to run. The run is settled when nothing is ready and nothing is
//! running; whatever is left in the graph at that point was blocked by a
//! failure and gets recorded as skipped.

use crate::graph::WorkflowGraph;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use relay_core::NodeId;
use std::collections::{HashMap, HashSet};

/// Tracks which nodes of an execution still need to run.
#[derive(Debug, Clone)]
pub struct WorkGraph {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
    running: HashSet<NodeId>,
    failed: HashSet<NodeId>,
}

impl WorkGraph {
    /// Builds the initial work graph, with every node pending.
    #[must_use]
    pub fn new(workflow: &WorkflowGraph) -> Self {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();

        for node in &workflow.nodes {
            indices.insert(node.id, graph.add_node(node.id));
        }
        for edge in &workflow.edges {
            graph.add_edge(indices[&edge.source], indices[&edge.target], ());
        }

        Self {
            graph,
            indices,
            running: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Nodes with no unfinished predecessors that are not already running.
    #[must_use]
    pub fn ready(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.edges_directed(idx, Direction::Incoming).count() == 0)
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter(|id| !self.running.contains(id))
            .copied()
            .collect()
    }

    /// Marks a node as running.
    pub fn mark_running(&mut self, node_id: NodeId) {
        if self.indices.contains_key(&node_id) {
            self.running.insert(node_id);
        }
    }

    /// Marks a node as finished successfully, unblocking its descendants.
    pub fn mark_succeeded(&mut self, node_id: NodeId) {
        self.running.remove(&node_id);
        if let Some(idx) = self.indices.remove(&node_id) {
            self.graph.remove_node(idx);
            // Removal swaps indices; the map has to be rebuilt.
            self.reindex();
        }
    }

    /// Marks a node as failed.
    ///
    /// The node stays in the graph with a self-edge, so it never becomes
    /// ready again and everything downstream of it stays blocked.
    pub fn mark_failed(&mut self, node_id: NodeId) {
        self.running.remove(&node_id);
        if let Some(&idx) = self.indices.get(&node_id) {
            self.graph.add_edge(idx, idx, ());
            self.failed.insert(node_id);
        }
    }

    /// True when nothing is ready and nothing is running.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.running.is_empty() && self.ready().is_empty()
    }

    /// True if any node failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Node ids that failed.
    #[must_use]
    pub fn failed_nodes(&self) -> &HashSet<NodeId> {
        &self.failed
    }

    /// Nodes still in the graph that are neither running nor failed.
    ///
    /// Once the run is settled these are exactly the nodes blocked by
    /// upstream failures.
    #[must_use]
    pub fn blocked_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter(|id| !self.failed.contains(id) && !self.running.contains(id))
            .copied()
            .collect()
    }

    fn reindex(&mut self) {
        self.indices.clear();
        for idx in self.graph.node_indices() {
            if let Some(&node_id) = self.graph.node_weight(idx) {
                self.indices.insert(node_id, idx);
            }
        }
    }
}
