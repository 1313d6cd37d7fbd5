//! Plan lookup for trigger-originated jobs.
//!
//! Jobs carry the owner's plan id so the execution controller can enforce
//! quota and concurrency without a tenant-directory round trip.

use async_trait::async_trait;
use relay_core::OwnerId;

/// Resolves the billing plan an owner is on.
#[async_trait]
pub trait PlanResolver: Send + Sync {
    async fn plan_for(&self, owner_id: OwnerId) -> String;
}

/// Puts every owner on a single plan.
pub struct StaticPlanResolver {
    plan_id: String,
}

impl StaticPlanResolver {
    #[must_use]
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
        }
    }
}

#[async_trait]
impl PlanResolver for StaticPlanResolver {
    async fn plan_for(&self, _owner_id: OwnerId) -> String {
        self.plan_id.clone()
    }
}
