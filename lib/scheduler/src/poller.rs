//! Polling trigger sweep.
//!
//! A fixed-interval sweep walks every active workflow, asks each polling
//! root capability whether new external data exists, and enqueues a
//! `Polling` job per discovery. One workflow's broken poll never stops
//! the others; faults are logged and the sweep moves on.

use crate::config::PollerConfig;
use crate::error::TriggerError;
use crate::plans::PlanResolver;
use futures::StreamExt;
use relay_workflow::{
    CapabilityKind, Envelope, ExecuteWorkflowJob, JobQueue, NodeRegistry, TriggerType,
    WorkflowGraph, WorkflowStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Periodic sweeper over polling-triggered workflows.
pub struct PollingSweeper {
    workflows: Arc<dyn WorkflowStore>,
    registry: NodeRegistry,
    queue: Arc<dyn JobQueue>,
    plans: Arc<dyn PlanResolver>,
    config: PollerConfig,
}

impl PollingSweeper {
    #[must_use]
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        registry: NodeRegistry,
        queue: Arc<dyn JobQueue>,
        plans: Arc<dyn PlanResolver>,
        config: PollerConfig,
    ) -> Self {
        Self {
            workflows,
            registry,
            queue,
            plans,
            config,
        }
    }

    /// Runs one sweep over all active workflows.
    ///
    /// Workflows are polled concurrently up to the configured limit.
    /// Returns the number of jobs enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error only if the workflow list itself cannot be read.
    /// Per-workflow faults are logged and skipped.
    pub async fn sweep_once(&self) -> Result<usize, TriggerError> {
        let active = self.workflows.list_active().await?;
        let enqueued = AtomicUsize::new(0);

        futures::stream::iter(active)
            .for_each_concurrent(self.config.max_concurrent_polls, |workflow| {
                let enqueued = &enqueued;
                async move {
                    match self.poll_workflow(&workflow).await {
                        Ok(count) => {
                            enqueued.fetch_add(count, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(
                                workflow_id = %workflow.id,
                                error = %e,
                                "polling sweep failed for workflow"
                            );
                        }
                    }
                }
            })
            .await;

        Ok(enqueued.load(Ordering::Relaxed))
    }

    /// Polls one workflow's root trigger nodes, enqueuing a job per
    /// discovery.
    async fn poll_workflow(&self, workflow: &WorkflowGraph) -> Result<usize, TriggerError> {
        let mut enqueued = 0;
        for node in workflow.root_nodes() {
            let Some(capability) = self.registry.resolve(&node.type_id) else {
                continue;
            };
            if capability.kind() != CapabilityKind::PollingTrigger {
                continue;
            }

            match capability.poll(&node.config).await {
                Ok(Some(payload)) => {
                    let plan_id = self.plans.plan_for(workflow.owner_id).await;
                    let job = ExecuteWorkflowJob::from_snapshot(
                        workflow,
                        plan_id,
                        TriggerType::Polling,
                        payload,
                    );
                    debug!(
                        workflow_id = %workflow.id,
                        node_id = %node.id,
                        execution_id = %job.execution_id,
                        "polling trigger found new data"
                    );
                    self.queue.enqueue(Envelope::new(job)).await?;
                    enqueued += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        workflow_id = %workflow.id,
                        node_id = %node.id,
                        error = %e,
                        "polling capability failed"
                    );
                }
            }
        }
        Ok(enqueued)
    }

    /// Spawns the sweep loop. The first sweep runs immediately, then one
    /// per interval; a slow sweep delays the next tick instead of
    /// bunching.
    #[must_use]
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep_once().await {
                            Ok(count) if count > 0 => {
                                debug!(jobs = count, "polling sweep enqueued jobs");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(error = %e, "polling sweep failed");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running sweep loop.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Asks the loop to stop after the current sweep.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Waits for the loop to exit.
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}
