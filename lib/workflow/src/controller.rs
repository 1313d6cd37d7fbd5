//! Execution controller: admits and runs execution jobs.
//!
//! The controller wraps the graph executor with everything a durable,
//! at-least-once job delivery needs:
//!
//! - redelivery of a job whose execution id is already terminal replays
//!   the recorded outcome instead of re-running;
//! - scheduler-triggered jobs re-verify the workflow is still active and
//!   record a synchronous skip when it is not;
//! - quota is checked before any record exists;
//! - per-owner concurrency is capped by a keyed semaphore, excess work
//!   waits rather than failing;
//! - ledger writes are retried a bounded number of times on
//!   infrastructure faults, and each phase is idempotent so a crash and
//!   redelivery resumes instead of duplicating;
//! - the usage counter is incremented only by the caller whose `finish`
//!   call actually flipped the record to terminal.

use crate::error::{ControllerError, StoreError};
use crate::execution::{ExecutionRecord, ExecutionStatus};
use crate::executor::GraphExecutor;
use crate::job::ExecuteWorkflowJob;
use crate::ledger::ExecutionStore;
use crate::store::WorkflowStore;
use chrono::Utc;
use relay_core::{ExecutionId, OwnerId};
use relay_quota::QuotaGuard;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// How many times an infrastructure fault is retried per phase.
const DEFAULT_RETRY_LIMIT: u32 = 3;

/// How a job was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum HandledExecution {
    /// The graph ran in this call.
    Completed(ExecutionRecord),
    /// A terminal record already existed for the job's execution id.
    Replayed(ExecutionRecord),
    /// The workflow was no longer active for a scheduler-triggered job.
    Skipped(ExecutionRecord),
}

impl HandledExecution {
    /// The execution record behind this outcome.
    #[must_use]
    pub fn record(&self) -> &ExecutionRecord {
        match self {
            Self::Completed(r) | Self::Replayed(r) | Self::Skipped(r) => r,
        }
    }
}

/// Admits, runs, and persists workflow executions.
pub struct ExecutionController {
    executor: GraphExecutor,
    ledger: Arc<dyn ExecutionStore>,
    workflows: Arc<dyn WorkflowStore>,
    quota: QuotaGuard,
    semaphores: Mutex<HashMap<OwnerId, Arc<Semaphore>>>,
    retry_limit: u32,
}

impl ExecutionController {
    /// Creates a controller.
    pub fn new(
        executor: GraphExecutor,
        ledger: Arc<dyn ExecutionStore>,
        workflows: Arc<dyn WorkflowStore>,
        quota: QuotaGuard,
    ) -> Self {
        Self {
            executor,
            ledger,
            workflows,
            quota,
            semaphores: Mutex::new(HashMap::new()),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    /// Handles one execution job end to end.
    ///
    /// # Errors
    ///
    /// `Validation` and `Quota` rejections persist nothing; `Store` means
    /// the ledger stayed unreachable through all retries.
    pub async fn handle(
        &self,
        job: &ExecuteWorkflowJob,
    ) -> Result<HandledExecution, ControllerError> {
        let execution_id = job.execution_id;

        // Redelivery of an already-finished job: answer from the ledger.
        if let Some(existing) = self.retrying(execution_id, async || {
            self.ledger.get(execution_id).await
        })
        .await?
            && existing.status.is_terminal()
        {
            info!(%execution_id, status = ?existing.status, "replaying recorded outcome");
            return Ok(HandledExecution::Replayed(existing));
        }

        let graph = job.snapshot();
        self.executor.validate(&graph)?;

        // A trigger armed minutes ago must not run a workflow deactivated
        // since. Missing workflows count as stale too.
        if job.trigger_type.requires_active_workflow() {
            let current = self
                .retrying(execution_id, async || {
                    self.workflows.get(job.workflow_id).await
                })
                .await?;
            let active = current.is_some_and(|w| w.status.is_active());
            if !active {
                let record = ExecutionRecord::skipped(
                    execution_id,
                    job.workflow_id,
                    job.owner_id,
                    job.trigger_type,
                    job.trigger_payload.clone(),
                );
                self.retrying(execution_id, async || {
                    self.ledger.insert_skipped(&record).await
                })
                .await?;
                info!(%execution_id, workflow_id = %job.workflow_id, "workflow no longer active, skipped");
                return Ok(HandledExecution::Skipped(record));
            }
        }

        // Quota check happens before any record exists.
        self.quota
            .check_execution(job.owner_id, &job.plan_id)
            .await?;
        let limits = self.quota.limits(&job.plan_id)?;

        // Excess work waits on the owner's semaphore, it is not rejected.
        let semaphore = self.owner_semaphore(job.owner_id, limits.max_concurrency);
        let _permit = semaphore.acquire_owned().await.ok();

        let record = ExecutionRecord::running(
            execution_id,
            job.workflow_id,
            job.owner_id,
            job.trigger_type,
            job.trigger_payload.clone(),
        );
        self.retrying(execution_id, async || {
            self.ledger.insert_running(&record).await
        })
        .await?;

        let outcome = self
            .executor
            .execute(execution_id, &graph, &job.trigger_payload)
            .await?;

        let persisted = self
            .persist_outcome(execution_id, &outcome)
            .await;
        let latch_fired = match persisted {
            Ok(fired) => fired,
            Err(fault) => {
                // Retries are exhausted; record the fault as the terminal
                // error so the run is never silently lost.
                let _ = self
                    .ledger
                    .finish(
                        execution_id,
                        ExecutionStatus::Failed,
                        None,
                        Some(fault.to_string()),
                        Utc::now(),
                    )
                    .await;
                return Err(ControllerError::Store {
                    execution_id,
                    source: fault,
                });
            }
        };

        if latch_fired {
            if let Err(error) = self.quota.record_execution(job.owner_id).await {
                warn!(%execution_id, %error, "usage increment failed");
            }
        }

        let final_record = self
            .retrying(execution_id, async || self.ledger.get(execution_id).await)
            .await?
            .unwrap_or(record);
        info!(%execution_id, status = ?final_record.status, "execution finished");
        Ok(HandledExecution::Completed(final_record))
    }

    /// Persists node results, logs, and the terminal transition.
    ///
    /// Returns whether this call won the terminal latch.
    async fn persist_outcome(
        &self,
        execution_id: ExecutionId,
        outcome: &crate::executor::ExecutionOutcome,
    ) -> Result<bool, StoreError> {
        self.retry_store(execution_id, async || {
            self.ledger
                .append_node_results(execution_id, &outcome.node_results)
                .await
        })
        .await?;
        self.retry_store(execution_id, async || {
            self.ledger.append_logs(execution_id, &outcome.logs).await
        })
        .await?;
        self.retry_store(execution_id, async || {
            self.ledger
                .finish(
                    execution_id,
                    outcome.status,
                    Some(outcome.final_output.clone()),
                    outcome.error.clone(),
                    Utc::now(),
                )
                .await
        })
        .await
    }

    /// Bounded retry for a ledger operation, mapped into a controller error.
    async fn retrying<T>(
        &self,
        execution_id: ExecutionId,
        op: impl AsyncFnMut() -> Result<T, StoreError>,
    ) -> Result<T, ControllerError> {
        self.retry_store(execution_id, op)
            .await
            .map_err(|source| ControllerError::Store {
                execution_id,
                source,
            })
    }

    /// Bounded retry for a ledger operation.
    async fn retry_store<T>(
        &self,
        execution_id: ExecutionId,
        mut op: impl AsyncFnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.retry_limit => {
                    warn!(%execution_id, %error, attempt, "store fault, retrying");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Returns the owner's semaphore, creating it on first use.
    fn owner_semaphore(&self, owner_id: OwnerId, max_concurrency: u32) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock().unwrap();
        Arc::clone(
            semaphores
                .entry(owner_id)
                .or_insert_with(|| Arc::new(Semaphore::new(max_concurrency.max(1) as usize))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CapabilityError, ValidationError};
    use crate::execution::TriggerType;
    use crate::graph::{WorkflowGraph, WorkflowStatus};
    use crate::ledger::InMemoryExecutionStore;
    use crate::node::Node;
    use crate::registry::{Capability, EchoCapability, MockCapability, NodeRegistry};
    use crate::store::InMemoryWorkflowStore;
    use async_trait::async_trait;
    use relay_quota::{InMemoryUsageStore, PlanCatalog, PlanLimits, QuotaError, ResourceKind, UsageKey, UsageStore};
    use serde_json::{Value as JsonValue, json};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    struct Harness {
        controller: ExecutionController,
        ledger: InMemoryExecutionStore,
        workflows: InMemoryWorkflowStore,
        usage: InMemoryUsageStore,
    }

    fn plan(max_per_month: u64, max_concurrency: u32) -> PlanCatalog {
        PlanCatalog::new().with_plan(
            "test",
            PlanLimits {
                max_active_workflows: 10,
                max_executions_per_month: max_per_month,
                max_concurrency,
            },
        )
    }

    fn harness(registry: NodeRegistry, catalog: PlanCatalog) -> Harness {
        let ledger = InMemoryExecutionStore::new();
        let workflows = InMemoryWorkflowStore::new();
        let usage = InMemoryUsageStore::new();
        let controller = ExecutionController::new(
            GraphExecutor::new(registry),
            Arc::new(ledger.clone()),
            Arc::new(workflows.clone()),
            QuotaGuard::new(catalog, Arc::new(usage.clone())),
        );
        Harness {
            controller,
            ledger,
            workflows,
            usage,
        }
    }

    fn echo_registry() -> NodeRegistry {
        NodeRegistry::new().with("echo", Arc::new(EchoCapability))
    }

    fn single_node_workflow() -> WorkflowGraph {
        let mut workflow = WorkflowGraph::new(relay_core::OwnerId::new(), "wf");
        workflow.status = WorkflowStatus::Active;
        workflow.add_node(Node::new("echo", json!({})));
        workflow
    }

    async fn usage_for(harness: &Harness, owner: relay_core::OwnerId) -> u64 {
        harness
            .usage
            .get(&UsageKey::current(owner, ResourceKind::Executions))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_run_persists_and_increments_usage() {
        let h = harness(echo_registry(), plan(100, 5));
        let workflow = single_node_workflow();
        let job = ExecuteWorkflowJob::from_snapshot(
            &workflow,
            "test",
            TriggerType::Manual,
            json!({"hello": "world"}),
        );

        let handled = h.controller.handle(&job).await.unwrap();
        let record = match handled {
            HandledExecution::Completed(r) => r,
            other => panic!("expected completed, got {other:?}"),
        };

        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert!(record.completed_at.is_some());
        assert_eq!(
            h.ledger.node_results(job.execution_id).await.unwrap().len(),
            1
        );
        assert_eq!(usage_for(&h, workflow.owner_id).await, 1);
    }

    #[tokio::test]
    async fn redelivery_replays_without_double_increment() {
        let h = harness(echo_registry(), plan(100, 5));
        let workflow = single_node_workflow();
        let job =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));

        let first = h.controller.handle(&job).await.unwrap();
        assert!(matches!(first, HandledExecution::Completed(_)));

        let second = h.controller.handle(&job).await.unwrap();
        let replayed = match second {
            HandledExecution::Replayed(r) => r,
            other => panic!("expected replay, got {other:?}"),
        };
        assert_eq!(replayed.id, job.execution_id);

        // One record, one increment.
        assert_eq!(
            h.ledger.list_for_workflow(workflow.id).await.unwrap().len(),
            1
        );
        assert_eq!(usage_for(&h, workflow.owner_id).await, 1);
    }

    #[tokio::test]
    async fn node_failure_is_terminal_and_still_counted() {
        let registry = NodeRegistry::new().with(
            "broken",
            Arc::new(MockCapability::failing(CapabilityError::OperationFailed {
                message: "boom".to_string(),
            })),
        );
        let h = harness(registry, plan(100, 5));
        let mut workflow = WorkflowGraph::new(relay_core::OwnerId::new(), "wf");
        workflow.status = WorkflowStatus::Active;
        workflow.add_node(Node::new("broken", json!({})));
        let job =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));

        let handled = h.controller.handle(&job).await.unwrap();
        let record = handled.record().clone();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("failed"));
        assert_eq!(usage_for(&h, workflow.owner_id).await, 1);
    }

    #[tokio::test]
    async fn over_quota_job_is_rejected_with_no_record() {
        let h = harness(echo_registry(), plan(10, 5));
        let workflow = single_node_workflow();

        for _ in 0..10 {
            let job = ExecuteWorkflowJob::from_snapshot(
                &workflow,
                "test",
                TriggerType::Manual,
                json!({}),
            );
            h.controller.handle(&job).await.unwrap();
        }

        let eleventh =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));
        let error = h.controller.handle(&eleventh).await.unwrap_err();
        assert!(matches!(
            error,
            ControllerError::Quota(QuotaError::Exceeded { .. })
        ));
        assert!(h.ledger.get(eleventh.execution_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_graph_is_rejected_with_no_record() {
        let h = harness(echo_registry(), plan(100, 5));
        let mut workflow = single_node_workflow();
        let a = workflow.nodes[0].id;
        let b = workflow.add_node(Node::new("echo", json!({})));
        workflow.add_edge(a, b).unwrap();
        workflow.add_edge(b, a).unwrap();

        let job =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));
        let error = h.controller.handle(&job).await.unwrap_err();
        assert!(matches!(
            error,
            ControllerError::Validation(ValidationError::CycleDetected)
        ));
        assert!(h.ledger.get(job.execution_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_scheduled_job_is_skipped_without_usage() {
        let h = harness(echo_registry(), plan(100, 5));
        let mut workflow = single_node_workflow();
        workflow.status = WorkflowStatus::Inactive;
        h.workflows.put(workflow.clone()).await.unwrap();

        let job = ExecuteWorkflowJob::from_snapshot(
            &workflow,
            "test",
            TriggerType::Scheduled,
            json!({}),
        );
        let handled = h.controller.handle(&job).await.unwrap();
        let record = match handled {
            HandledExecution::Skipped(r) => r,
            other => panic!("expected skipped, got {other:?}"),
        };

        assert_eq!(record.status, ExecutionStatus::Skipped);
        assert!(h.ledger.node_results(job.execution_id).await.unwrap().is_empty());
        assert_eq!(usage_for(&h, workflow.owner_id).await, 0);
    }

    #[tokio::test]
    async fn manual_job_ignores_workflow_status() {
        let h = harness(echo_registry(), plan(100, 5));
        let mut workflow = single_node_workflow();
        workflow.status = WorkflowStatus::Draft;
        h.workflows.put(workflow.clone()).await.unwrap();

        let job =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));
        let handled = h.controller.handle(&job).await.unwrap();
        assert!(matches!(handled, HandledExecution::Completed(_)));
    }

    #[tokio::test]
    async fn per_owner_concurrency_is_capped() {
        struct SlowCapability;

        #[async_trait]
        impl Capability for SlowCapability {
            async fn run(
                &self,
                _input: JsonValue,
                _config: &JsonValue,
            ) -> Result<JsonValue, CapabilityError> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(json!({}))
            }
        }

        let registry = NodeRegistry::new().with("slow", Arc::new(SlowCapability));
        let h = harness(registry, plan(100, 1));

        let mut workflow = WorkflowGraph::new(relay_core::OwnerId::new(), "wf");
        workflow.status = WorkflowStatus::Active;
        workflow.add_node(Node::new("slow", json!({})));

        let job_a =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));
        let job_b =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));

        let started = Instant::now();
        let (a, b) = tokio::join!(h.controller.handle(&job_a), h.controller.handle(&job_b));
        a.unwrap();
        b.unwrap();

        // With a concurrency cap of one the runs serialize.
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    /// Delegates to an in-memory ledger but fails the first few
    /// `insert_running` calls.
    struct FlakyLedger {
        inner: InMemoryExecutionStore,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl crate::ledger::ExecutionStore for FlakyLedger {
        async fn insert_running(&self, record: &ExecutionRecord) -> Result<bool, StoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable {
                    message: "transient".to_string(),
                });
            }
            self.inner.insert_running(record).await
        }

        async fn finish(
            &self,
            id: ExecutionId,
            status: ExecutionStatus,
            final_output: Option<JsonValue>,
            error: Option<String>,
            completed_at: chrono::DateTime<chrono::Utc>,
        ) -> Result<bool, StoreError> {
            self.inner
                .finish(id, status, final_output, error, completed_at)
                .await
        }

        async fn insert_skipped(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
            self.inner.insert_skipped(record).await
        }

        async fn append_node_results(
            &self,
            id: ExecutionId,
            results: &[crate::execution::NodeResult],
        ) -> Result<(), StoreError> {
            self.inner.append_node_results(id, results).await
        }

        async fn append_logs(
            &self,
            id: ExecutionId,
            logs: &[crate::execution::LogEntry],
        ) -> Result<(), StoreError> {
            self.inner.append_logs(id, logs).await
        }

        async fn get(&self, id: ExecutionId) -> Result<Option<ExecutionRecord>, StoreError> {
            self.inner.get(id).await
        }

        async fn node_results(
            &self,
            id: ExecutionId,
        ) -> Result<Vec<crate::execution::NodeResult>, StoreError> {
            self.inner.node_results(id).await
        }

        async fn list_for_workflow(
            &self,
            workflow_id: relay_core::WorkflowId,
        ) -> Result<Vec<ExecutionRecord>, StoreError> {
            self.inner.list_for_workflow(workflow_id).await
        }
    }

    #[tokio::test]
    async fn transient_store_fault_is_retried() {
        let inner = InMemoryExecutionStore::new();
        let flaky = FlakyLedger {
            inner: inner.clone(),
            failures_left: AtomicU32::new(2),
        };
        let usage = InMemoryUsageStore::new();
        let controller = ExecutionController::new(
            GraphExecutor::new(echo_registry()),
            Arc::new(flaky),
            Arc::new(InMemoryWorkflowStore::new()),
            QuotaGuard::new(plan(100, 5), Arc::new(usage)),
        );

        let workflow = single_node_workflow();
        let job =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));

        let handled = controller.handle(&job).await.unwrap();
        assert_eq!(handled.record().status, ExecutionStatus::Succeeded);
        assert!(inner.get(job.execution_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn exhausted_store_faults_surface_as_error() {
        let flaky = FlakyLedger {
            inner: InMemoryExecutionStore::new(),
            failures_left: AtomicU32::new(100),
        };
        let controller = ExecutionController::new(
            GraphExecutor::new(echo_registry()),
            Arc::new(flaky),
            Arc::new(InMemoryWorkflowStore::new()),
            QuotaGuard::new(plan(100, 5), Arc::new(InMemoryUsageStore::new())),
        );

        let workflow = single_node_workflow();
        let job =
            ExecuteWorkflowJob::from_snapshot(&workflow, "test", TriggerType::Manual, json!({}));

        let error = controller.handle(&job).await.unwrap_err();
        assert!(matches!(error, ControllerError::Store { .. }));
    }
}
