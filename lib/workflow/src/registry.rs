//! Node registry: maps type ids to executable capabilities.
//!
//! This is the extension point integrations plug into. The executor and
//! scheduler only ever see the `Capability` trait; concrete node kinds
//! (HTTP calls, transforms, integration actions) live behind it.

use crate::error::CapabilityError;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// What role a node type plays in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// A regular step: runs when its predecessors finish.
    Action,
    /// A cron trigger root; its config carries the schedule.
    ScheduleTrigger,
    /// A polling trigger root; the scheduler sweep calls `poll` on it.
    PollingTrigger,
}

/// An executable node behavior.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Runs the node with its merged input and configuration.
    async fn run(&self, input: JsonValue, config: &JsonValue) -> Result<JsonValue, CapabilityError>;

    /// The role this node type plays.
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Action
    }

    /// Checks for new external data. Only meaningful for
    /// `PollingTrigger` kinds.
    ///
    /// Returns `Ok(Some(payload))` when there is new data to trigger on,
    /// `Ok(None)` when there is nothing new.
    async fn poll(&self, _config: &JsonValue) -> Result<Option<JsonValue>, CapabilityError> {
        Ok(None)
    }
}

/// A registered node type: its input schema and its capability.
#[derive(Clone)]
pub struct Registered {
    /// JSON schema describing the node's expected config/input shape.
    pub schema: JsonValue,
    pub capability: Arc<dyn Capability>,
}

/// Registry of node capabilities keyed by type id.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: HashMap<String, Registered>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability under a type id, replacing any previous one.
    pub fn register(
        &mut self,
        type_id: impl Into<String>,
        schema: JsonValue,
        capability: Arc<dyn Capability>,
    ) {
        self.entries
            .insert(type_id.into(), Registered { schema, capability });
    }

    /// Builder-style registration without a schema.
    #[must_use]
    pub fn with(mut self, type_id: impl Into<String>, capability: Arc<dyn Capability>) -> Self {
        self.register(type_id, JsonValue::Null, capability);
        self
    }

    /// Resolves a type id to its capability.
    #[must_use]
    pub fn resolve(&self, type_id: &str) -> Option<Arc<dyn Capability>> {
        self.entries
            .get(type_id)
            .map(|r| Arc::clone(&r.capability))
    }

    /// The registered schema for a type id.
    #[must_use]
    pub fn schema(&self, type_id: &str) -> Option<&JsonValue> {
        self.entries.get(type_id).map(|r| &r.schema)
    }

    /// Returns true if the type id is registered.
    #[must_use]
    pub fn contains(&self, type_id: &str) -> bool {
        self.entries.contains_key(type_id)
    }
}

/// A capability that returns its merged input unchanged.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    async fn run(
        &self,
        input: JsonValue,
        _config: &JsonValue,
    ) -> Result<JsonValue, CapabilityError> {
        Ok(input)
    }
}

/// The schedule trigger node type: carries the cron config, passes the
/// trigger payload through when the graph runs.
pub struct ScheduleCapability;

#[async_trait]
impl Capability for ScheduleCapability {
    async fn run(
        &self,
        input: JsonValue,
        _config: &JsonValue,
    ) -> Result<JsonValue, CapabilityError> {
        Ok(input)
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::ScheduleTrigger
    }
}

/// A capability with a fixed outcome, for tests and wiring checks.
pub struct MockCapability {
    /// When set, every run and poll fails with this error.
    pub fail_with: Option<CapabilityError>,
    /// Output returned on success.
    pub output: JsonValue,
    /// Payload returned by `poll`, if any.
    pub poll_result: Option<JsonValue>,
    /// Role this mock reports.
    pub kind: CapabilityKind,
}

impl MockCapability {
    /// A capability that succeeds with the given output.
    #[must_use]
    pub fn succeeding(output: JsonValue) -> Self {
        Self {
            fail_with: None,
            output,
            poll_result: None,
            kind: CapabilityKind::Action,
        }
    }

    /// A capability that fails every run.
    #[must_use]
    pub fn failing(error: CapabilityError) -> Self {
        Self {
            fail_with: Some(error),
            output: JsonValue::Null,
            poll_result: None,
            kind: CapabilityKind::Action,
        }
    }

    /// A polling trigger that reports the given payload as new data.
    #[must_use]
    pub fn polling_with(payload: Option<JsonValue>) -> Self {
        Self {
            fail_with: None,
            output: JsonValue::Null,
            poll_result: payload,
            kind: CapabilityKind::PollingTrigger,
        }
    }
}

#[async_trait]
impl Capability for MockCapability {
    async fn run(
        &self,
        _input: JsonValue,
        _config: &JsonValue,
    ) -> Result<JsonValue, CapabilityError> {
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(self.output.clone()),
        }
    }

    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    async fn poll(&self, _config: &JsonValue) -> Result<Option<JsonValue>, CapabilityError> {
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(self.poll_result.clone()),
        }
    }
}
