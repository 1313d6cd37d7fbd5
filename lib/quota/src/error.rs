//! Error types for quota enforcement.

use std::fmt;

use crate::usage::ResourceKind;

/// Errors produced while enforcing plan quotas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaError {
    /// The owner has exhausted the plan allowance for a resource.
    Exceeded {
        /// Which resource ran out.
        resource: ResourceKind,
        /// The plan limit that was hit.
        limit: u64,
        /// Usage observed at check time.
        used: u64,
    },
    /// The plan id is not present in the catalog.
    UnknownPlan(String),
    /// The usage store could not be read or written.
    Store(UsageStoreError),
}

impl fmt::Display for QuotaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exceeded {
                resource,
                limit,
                used,
            } => write!(
                f,
                "quota exceeded for {resource}: used {used} of {limit}"
            ),
            Self::UnknownPlan(plan_id) => write!(f, "unknown plan: {plan_id}"),
            Self::Store(err) => write!(f, "usage store error: {err}"),
        }
    }
}

impl std::error::Error for QuotaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UsageStoreError> for QuotaError {
    fn from(err: UsageStoreError) -> Self {
        Self::Store(err)
    }
}

/// Errors from a usage counter backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageStoreError {
    /// The backend could not be reached.
    Unavailable(String),
}

impl fmt::Display for UsageStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "usage store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for UsageStoreError {}
