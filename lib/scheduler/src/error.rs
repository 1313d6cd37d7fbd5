//! Error types for the scheduler crate.

use relay_workflow::{QueueError, StoreError};
use std::fmt;

/// Problems with a schedule definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The cron expression failed to parse.
    InvalidCronExpression { expression: String, reason: String },
    /// The timezone name is not in the tz database.
    InvalidTimezone { timezone: String },
    /// The workflow has no schedule trigger node of the expected type.
    MissingScheduleTrigger { type_id: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            Self::InvalidTimezone { timezone } => {
                write!(f, "invalid timezone: {timezone}")
            }
            Self::MissingScheduleTrigger { type_id } => {
                write!(f, "no root node of type '{type_id}' with a cron config")
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Infrastructure faults hit while firing a trigger.
#[derive(Debug)]
pub enum TriggerError {
    /// The workflow or execution store was unreachable.
    Store(StoreError),
    /// The job queue rejected the publish.
    Queue(QueueError),
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error while firing trigger: {e}"),
            Self::Queue(e) => write!(f, "queue error while firing trigger: {e}"),
        }
    }
}

impl std::error::Error for TriggerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Queue(e) => Some(e),
        }
    }
}

impl From<StoreError> for TriggerError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<QueueError> for TriggerError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}
