//! Plan limit definitions.
//!
//! Each tenant is assigned a plan id. The catalog maps plan ids to the
//! hard limits enforced by the quota guard and the execution controller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hard limits attached to a billing plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum number of workflows that may be `Active` at once.
    pub max_active_workflows: u64,
    /// Maximum executions per calendar month.
    pub max_executions_per_month: u64,
    /// Maximum concurrently running executions.
    pub max_concurrency: u32,
}

impl PlanLimits {
    /// Limits for the free tier.
    #[must_use]
    pub const fn free() -> Self {
        Self {
            max_active_workflows: 5,
            max_executions_per_month: 1_000,
            max_concurrency: 2,
        }
    }

    /// Limits for the pro tier.
    #[must_use]
    pub const fn pro() -> Self {
        Self {
            max_active_workflows: 50,
            max_executions_per_month: 50_000,
            max_concurrency: 10,
        }
    }

    /// Limits for the enterprise tier.
    #[must_use]
    pub const fn enterprise() -> Self {
        Self {
            max_active_workflows: 500,
            max_executions_per_month: 1_000_000,
            max_concurrency: 50,
        }
    }
}

/// A catalog of plans keyed by plan id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCatalog {
    plans: HashMap<String, PlanLimits>,
}

impl PlanCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plans: HashMap::new(),
        }
    }

    /// Adds or replaces a plan.
    pub fn insert(&mut self, plan_id: impl Into<String>, limits: PlanLimits) {
        self.plans.insert(plan_id.into(), limits);
    }

    /// Builder-style variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with_plan(mut self, plan_id: impl Into<String>, limits: PlanLimits) -> Self {
        self.insert(plan_id, limits);
        self
    }

    /// Looks up the limits for a plan id.
    #[must_use]
    pub fn get(&self, plan_id: &str) -> Option<&PlanLimits> {
        self.plans.get(plan_id)
    }
}

impl Default for PlanCatalog {
    /// The standard three-tier catalog.
    fn default() -> Self {
        Self::new()
            .with_plan("free", PlanLimits::free())
            .with_plan("pro", PlanLimits::pro())
            .with_plan("enterprise", PlanLimits::enterprise())
    }
}
