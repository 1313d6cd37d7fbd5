//! Quota enforcement against plan limits.
//!
//! The guard is checked before an execution record is created and fed after
//! the execution reaches a terminal state. The check is read-only; the
//! increment lives with whoever observed the terminal transition, so a
//! redelivered job that short-circuits on an existing terminal record never
//! counts twice.

use relay_core::OwnerId;
use std::sync::Arc;
use tracing::debug;

use crate::error::QuotaError;
use crate::limits::{PlanCatalog, PlanLimits};
use crate::usage::{ResourceKind, UsageKey, UsageStore};

/// Enforces plan limits for tenant-owned resources.
#[derive(Clone)]
pub struct QuotaGuard {
    catalog: PlanCatalog,
    store: Arc<dyn UsageStore>,
}

impl QuotaGuard {
    /// Creates a guard over the given catalog and usage store.
    pub fn new(catalog: PlanCatalog, store: Arc<dyn UsageStore>) -> Self {
        Self { catalog, store }
    }

    /// Looks up the limits for a plan id.
    pub fn limits(&self, plan_id: &str) -> Result<PlanLimits, QuotaError> {
        self.catalog
            .get(plan_id)
            .copied()
            .ok_or_else(|| QuotaError::UnknownPlan(plan_id.to_string()))
    }

    /// Checks whether the owner may start one more execution this month.
    ///
    /// Read-only. Call before creating any execution record.
    pub async fn check_execution(
        &self,
        owner_id: OwnerId,
        plan_id: &str,
    ) -> Result<(), QuotaError> {
        let limits = self.limits(plan_id)?;
        let key = UsageKey::current(owner_id, ResourceKind::Executions);
        let used = self.store.get(&key).await?;

        if used >= limits.max_executions_per_month {
            debug!(%owner_id, plan_id, used, limit = limits.max_executions_per_month,
                "execution quota exhausted");
            return Err(QuotaError::Exceeded {
                resource: ResourceKind::Executions,
                limit: limits.max_executions_per_month,
                used,
            });
        }
        Ok(())
    }

    /// Checks whether the owner may activate one more workflow.
    ///
    /// The caller supplies the current count of active workflows, since that
    /// lives in the workflow store rather than in a usage counter.
    pub fn check_activation(
        &self,
        plan_id: &str,
        active_workflows: u64,
    ) -> Result<(), QuotaError> {
        let limits = self.limits(plan_id)?;
        if active_workflows >= limits.max_active_workflows {
            return Err(QuotaError::Exceeded {
                resource: ResourceKind::ActiveWorkflows,
                limit: limits.max_active_workflows,
                used: active_workflows,
            });
        }
        Ok(())
    }

    /// Counts one completed execution against the current billing period.
    ///
    /// Call at most once per execution, after the terminal transition.
    pub async fn record_execution(&self, owner_id: OwnerId) -> Result<u64, QuotaError> {
        let key = UsageKey::current(owner_id, ResourceKind::Executions);
        let count = self.store.increment(&key).await?;
        debug!(%owner_id, count, "recorded execution usage");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::PlanLimits;
    use crate::usage::InMemoryUsageStore;

    fn guard_with_limit(max_per_month: u64) -> QuotaGuard {
        let catalog = PlanCatalog::new().with_plan(
            "test",
            PlanLimits {
                max_active_workflows: 3,
                max_executions_per_month: max_per_month,
                max_concurrency: 2,
            },
        );
        QuotaGuard::new(catalog, Arc::new(InMemoryUsageStore::new()))
    }

    #[tokio::test]
    async fn check_passes_under_limit() {
        let guard = guard_with_limit(10);
        let owner = OwnerId::new();
        assert!(guard.check_execution(owner, "test").await.is_ok());
    }

    #[tokio::test]
    async fn eleventh_execution_rejected_on_ten_per_month_plan() {
        let guard = guard_with_limit(10);
        let owner = OwnerId::new();

        for _ in 0..10 {
            guard.check_execution(owner, "test").await.unwrap();
            guard.record_execution(owner).await.unwrap();
        }

        let err = guard.check_execution(owner, "test").await.unwrap_err();
        assert!(matches!(
            err,
            QuotaError::Exceeded {
                limit: 10,
                used: 10,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let guard = guard_with_limit(10);
        let err = guard
            .check_execution(OwnerId::new(), "no-such-plan")
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::UnknownPlan(_)));
    }

    #[tokio::test]
    async fn owners_do_not_share_usage() {
        let guard = guard_with_limit(1);
        let owner_a = OwnerId::new();
        let owner_b = OwnerId::new();

        guard.record_execution(owner_a).await.unwrap();

        assert!(guard.check_execution(owner_a, "test").await.is_err());
        assert!(guard.check_execution(owner_b, "test").await.is_ok());
    }

    #[test]
    fn activation_limit_enforced() {
        let guard = guard_with_limit(10);
        assert!(guard.check_activation("test", 2).is_ok());
        assert!(guard.check_activation("test", 3).is_err());
    }
}
