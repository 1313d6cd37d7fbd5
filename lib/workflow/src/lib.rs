//! Workflow graph model and execution engine.
//!
//! The pieces, bottom up: a serializable graph model ([`graph`]), a
//! registry of pluggable node capabilities ([`registry`]), a concurrent
//! DAG executor ([`executor`]), a durable execution ledger ([`ledger`]),
//! and a controller ([`controller`]) that ties them together with quota
//! checks, per-owner concurrency caps, and idempotent handling of
//! at-least-once job delivery ([`job`], [`nats`]).

pub mod controller;
pub mod dependency;
pub mod edge;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod job;
pub mod ledger;
pub mod nats;
pub mod node;
pub mod registry;
pub mod store;

pub use controller::{ExecutionController, HandledExecution};
pub use edge::Edge;
pub use envelope::Envelope;
pub use error::{CapabilityError, ControllerError, QueueError, StoreError, ValidationError};
pub use execution::{
    ExecutionRecord, ExecutionStatus, LogEntry, LogLevel, NodeResult, NodeRunStatus, TriggerType,
};
pub use executor::{ExecutionOutcome, GraphExecutor};
pub use graph::{WorkflowGraph, WorkflowStatus};
pub use job::{ExecuteWorkflowJob, InMemoryJobQueue, JobQueue};
pub use ledger::{ExecutionStore, InMemoryExecutionStore};
pub use node::Node;
pub use registry::{
    Capability, CapabilityKind, EchoCapability, MockCapability, NodeRegistry, Registered,
    ScheduleCapability,
};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
