//! Core domain types and utilities for the relay workflow engine.
//!
//! This crate provides the strongly-typed identifiers and the error
//! handling foundation shared by every other crate in the workspace.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, NodeId, NodeResultId, OwnerId, ParseIdError, WorkflowId};
