//! Graph executor: walks a workflow DAG and runs node capabilities.
//!
//! Nodes run as soon as all their predecessors have finished, so
//! independent branches execute concurrently. A node failure is a business
//! outcome: the failed node's descendants are recorded as skipped, but
//! every branch not downstream of the failure still runs to completion.
//!
//! Input merge policy: a root node receives the trigger payload directly;
//! any other node receives a JSON object with one entry per incoming edge,
//! keyed by the source node's id. Keyed merge avoids silent overwrite when
//! several sources feed one node.

use crate::dependency::WorkGraph;
use crate::error::{CapabilityError, ValidationError};
use crate::execution::{ExecutionStatus, LogEntry, LogLevel, NodeResult};
use crate::graph::WorkflowGraph;
use crate::registry::NodeRegistry;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use relay_core::{ExecutionId, NodeId};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// The in-memory result of running a graph.
///
/// The controller persists this through the execution ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// `Succeeded` iff every reachable node succeeded.
    pub status: ExecutionStatus,
    /// Outputs of terminal nodes, keyed by node id.
    pub final_output: JsonValue,
    /// One result per executed or skipped node.
    pub node_results: Vec<NodeResult>,
    /// Diagnostic trail for the run.
    pub logs: Vec<LogEntry>,
    /// Terminal error summary, set when `status` is `Failed`.
    pub error: Option<String>,
}

/// Runs workflow graphs against a node registry.
#[derive(Clone)]
pub struct GraphExecutor {
    registry: NodeRegistry,
}

type NodeCompletion = (NodeId, Result<JsonValue, CapabilityError>, u64);

impl GraphExecutor {
    /// Creates an executor over the given registry.
    #[must_use]
    pub fn new(registry: NodeRegistry) -> Self {
        Self { registry }
    }

    /// Returns the registry this executor resolves node types against.
    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Validates a graph snapshot without running it.
    ///
    /// # Errors
    ///
    /// Returns the first structural or resolution problem found.
    pub fn validate(&self, graph: &WorkflowGraph) -> Result<(), ValidationError> {
        if graph.nodes.is_empty() {
            return Err(ValidationError::EmptyGraph);
        }
        graph.validate_structure()?;
        for node in &graph.nodes {
            if !self.registry.contains(&node.type_id) {
                return Err(ValidationError::UnknownNodeType {
                    node_id: node.id,
                    type_id: node.type_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Executes a validated graph snapshot.
    ///
    /// Node failures do not surface as errors here; they are reflected in
    /// the outcome's status and node results.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` before any node runs if the snapshot is
    /// malformed.
    pub async fn execute(
        &self,
        execution_id: ExecutionId,
        graph: &WorkflowGraph,
        trigger_payload: &JsonValue,
    ) -> Result<ExecutionOutcome, ValidationError> {
        self.validate(graph)?;

        let mut work = WorkGraph::new(graph);
        let mut outputs: HashMap<NodeId, JsonValue> = HashMap::new();
        let mut node_results = Vec::new();
        let mut logs = Vec::new();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, NodeCompletion>> =
            FuturesUnordered::new();

        loop {
            for node_id in work.ready() {
                let input = self.merge_input(graph, node_id, trigger_payload, &outputs);
                // Both exist: validate() resolved every node and type.
                let Some(node) = graph.node(node_id) else {
                    continue;
                };
                let Some(capability) = self.registry.resolve(&node.type_id) else {
                    continue;
                };
                let config = node.config.clone();

                work.mark_running(node_id);
                debug!(%execution_id, %node_id, type_id = %node.type_id, "node started");
                in_flight.push(Box::pin(async move {
                    let started = Instant::now();
                    let result = capability.run(input, &config).await;
                    let duration_ms = started.elapsed().as_millis() as u64;
                    (node_id, result, duration_ms)
                }));
            }

            let Some((node_id, result, duration_ms)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(output) => {
                    debug!(%execution_id, %node_id, duration_ms, "node succeeded");
                    logs.push(LogEntry::new(
                        execution_id,
                        Some(node_id),
                        LogLevel::Info,
                        "node succeeded",
                        None,
                    ));
                    node_results.push(NodeResult::succeeded(
                        execution_id,
                        node_id,
                        output.clone(),
                        duration_ms,
                    ));
                    outputs.insert(node_id, output);
                    work.mark_succeeded(node_id);
                }
                Err(error) => {
                    warn!(%execution_id, %node_id, %error, "node failed");
                    logs.push(LogEntry::new(
                        execution_id,
                        Some(node_id),
                        LogLevel::Error,
                        error.to_string(),
                        None,
                    ));
                    node_results.push(NodeResult::failed(
                        execution_id,
                        node_id,
                        error.to_string(),
                        duration_ms,
                    ));
                    work.mark_failed(node_id);
                }
            }
        }

        for node_id in work.blocked_nodes() {
            logs.push(LogEntry::new(
                execution_id,
                Some(node_id),
                LogLevel::Warn,
                "node skipped: upstream failure",
                None,
            ));
            node_results.push(NodeResult::skipped(execution_id, node_id));
        }

        let (status, error) = if work.has_failures() {
            let failed: Vec<String> = work.failed_nodes().iter().map(ToString::to_string).collect();
            (
                ExecutionStatus::Failed,
                Some(format!("node(s) failed: {}", failed.join(", "))),
            )
        } else {
            (ExecutionStatus::Succeeded, None)
        };

        let mut final_output = JsonMap::new();
        for node in graph.terminal_nodes() {
            if let Some(output) = outputs.get(&node.id) {
                final_output.insert(node.id.to_string(), output.clone());
            }
        }

        Ok(ExecutionOutcome {
            status,
            final_output: JsonValue::Object(final_output),
            node_results,
            logs,
            error,
        })
    }

    /// Builds a node's input from its predecessors' outputs.
    fn merge_input(
        &self,
        graph: &WorkflowGraph,
        node_id: NodeId,
        trigger_payload: &JsonValue,
        outputs: &HashMap<NodeId, JsonValue>,
    ) -> JsonValue {
        let predecessors = graph.predecessors(node_id);
        if predecessors.is_empty() {
            return trigger_payload.clone();
        }

        let mut merged = JsonMap::new();
        for source in predecessors {
            if let Some(output) = outputs.get(&source) {
                merged.insert(source.to_string(), output.clone());
            }
        }
        JsonValue::Object(merged)
    }
}
