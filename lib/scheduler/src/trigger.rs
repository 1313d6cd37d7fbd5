//! Self-rescheduling cron triggers.
//!
//! An armed trigger sleeps until the schedule's next fire time, fires,
//! and re-arms itself for the following occurrence. Firing re-reads the
//! workflow from the store: an active workflow gets a job on the queue, a
//! deactivated or deleted one gets a synchronous `Skipped` record and the
//! trigger disarms for good. Infrastructure faults during a fire are
//! logged and the trigger re-arms, leaning on the queue's at-least-once
//! semantics for the next occurrence.

use crate::error::{ScheduleError, TriggerError};
use crate::plans::PlanResolver;
use crate::schedule::CronSchedule;
use chrono::Utc;
use relay_core::{ExecutionId, OwnerId, WorkflowId};
use relay_workflow::{
    Envelope, ExecuteWorkflowJob, ExecutionRecord, ExecutionStore, JobQueue, TriggerType,
    WorkflowGraph, WorkflowStore,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of an armed trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Sleeping until the next fire time.
    Armed,
    /// Evaluating a fire.
    Firing,
    /// No longer scheduled; terminal.
    Disarmed,
}

/// What one fire accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The workflow was active; a job was enqueued and the trigger re-arms.
    Enqueued(ExecutionId),
    /// The workflow was inactive or gone; a skipped record was written and
    /// the trigger disarms.
    Skipped(ExecutionId),
}

/// A cron trigger bound to one workflow.
pub struct ScheduledTrigger {
    workflow_id: WorkflowId,
    owner_id: OwnerId,
    plan_id: String,
    schedule: CronSchedule,
    workflows: Arc<dyn WorkflowStore>,
    ledger: Arc<dyn ExecutionStore>,
    queue: Arc<dyn JobQueue>,
}

impl ScheduledTrigger {
    /// Binds a schedule to a workflow.
    #[must_use]
    pub fn new(
        workflow: &WorkflowGraph,
        plan_id: impl Into<String>,
        schedule: CronSchedule,
        workflows: Arc<dyn WorkflowStore>,
        ledger: Arc<dyn ExecutionStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            workflow_id: workflow.id,
            owner_id: workflow.owner_id,
            plan_id: plan_id.into(),
            schedule,
            workflows,
            ledger,
            queue,
        }
    }

    /// Builds a trigger from the workflow's own schedule node.
    ///
    /// Looks for a root node of type `trigger_type_id` whose config carries
    /// `cron` (and optionally `timezone`, defaulting to UTC) and parses it.
    /// This is how a recovery sweep re-arms schedules after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if no such node exists or its config does not
    /// parse as a schedule.
    pub fn from_workflow(
        workflow: &WorkflowGraph,
        trigger_type_id: &str,
        plan_id: impl Into<String>,
        workflows: Arc<dyn WorkflowStore>,
        ledger: Arc<dyn ExecutionStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Result<Self, ScheduleError> {
        let config = workflow
            .root_nodes()
            .into_iter()
            .find(|node| node.type_id == trigger_type_id)
            .and_then(|node| {
                let cron = node.config.get("cron")?.as_str()?;
                let timezone = node
                    .config
                    .get("timezone")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("UTC");
                Some((cron.to_string(), timezone.to_string()))
            })
            .ok_or_else(|| ScheduleError::MissingScheduleTrigger {
                type_id: trigger_type_id.to_string(),
            })?;

        let schedule = CronSchedule::parse(&config.0, &config.1)?;
        Ok(Self::new(workflow, plan_id, schedule, workflows, ledger, queue))
    }

    /// The bound workflow id.
    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Fires once: re-verifies the workflow and either enqueues a job or
    /// records a skip.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read, the skip write, or the enqueue
    /// fails. The caller decides whether to re-arm.
    pub async fn fire(&self) -> Result<FireOutcome, TriggerError> {
        let workflow = self.workflows.get(self.workflow_id).await?;

        if let Some(workflow) = workflow
            && workflow.status.is_active()
        {
            let job = ExecuteWorkflowJob::from_snapshot(
                &workflow,
                &self.plan_id,
                TriggerType::Scheduled,
                JsonValue::Null,
            );
            let execution_id = job.execution_id;
            self.queue.enqueue(Envelope::new(job)).await?;
            debug!(
                workflow_id = %self.workflow_id,
                execution_id = %execution_id,
                "scheduled trigger enqueued job"
            );
            return Ok(FireOutcome::Enqueued(execution_id));
        }

        let record = ExecutionRecord::skipped(
            ExecutionId::new(),
            self.workflow_id,
            self.owner_id,
            TriggerType::Scheduled,
            JsonValue::Null,
        );
        self.ledger.insert_skipped(&record).await?;
        info!(
            workflow_id = %self.workflow_id,
            execution_id = %record.id,
            "workflow no longer active, recorded skip and disarming"
        );
        Ok(FireOutcome::Skipped(record.id))
    }

    /// Spawns the arm/fire loop and returns a handle to it.
    #[must_use]
    pub fn arm(self) -> TriggerHandle {
        let (state_tx, state_rx) = watch::channel(TriggerState::Armed);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                let Some(next) = self.schedule.next_after(Utc::now()) else {
                    info!(workflow_id = %self.workflow_id, "schedule has no future fires");
                    break;
                };
                let _ = state_tx.send(TriggerState::Armed);

                let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => break,
                }

                let _ = state_tx.send(TriggerState::Firing);
                match self.fire().await {
                    Ok(FireOutcome::Enqueued(_)) => {}
                    Ok(FireOutcome::Skipped(_)) => break,
                    Err(e) => {
                        warn!(
                            workflow_id = %self.workflow_id,
                            error = %e,
                            "trigger fire failed, re-arming for next occurrence"
                        );
                    }
                }
            }
            let _ = state_tx.send(TriggerState::Disarmed);
        });

        TriggerHandle {
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a spawned trigger loop.
pub struct TriggerHandle {
    state: watch::Receiver<TriggerState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TriggerHandle {
    /// The trigger's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TriggerState {
        *self.state.borrow()
    }

    /// Asks the loop to stop without firing again.
    pub fn disarm(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Waits for the loop to exit.
    pub async fn stopped(self) {
        let _ = self.task.await;
    }

    /// Returns true once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Keeps one live trigger task per scheduled workflow.
///
/// [`rearm_active`](Self::rearm_active) is the recovery sweep: after a
/// restart (or a crash between fire and re-arm) it walks the active
/// workflows and arms any schedule that lacks a live task. Re-running it
/// is safe; already-armed workflows are left alone.
pub struct ScheduleSupervisor {
    trigger_type_id: String,
    workflows: Arc<dyn WorkflowStore>,
    ledger: Arc<dyn ExecutionStore>,
    queue: Arc<dyn JobQueue>,
    plans: Arc<dyn PlanResolver>,
    handles: Mutex<HashMap<WorkflowId, TriggerHandle>>,
}

impl ScheduleSupervisor {
    /// Creates a supervisor for workflows whose schedule node has the
    /// given type id.
    #[must_use]
    pub fn new(
        trigger_type_id: impl Into<String>,
        workflows: Arc<dyn WorkflowStore>,
        ledger: Arc<dyn ExecutionStore>,
        queue: Arc<dyn JobQueue>,
        plans: Arc<dyn PlanResolver>,
    ) -> Self {
        Self {
            trigger_type_id: trigger_type_id.into(),
            workflows,
            ledger,
            queue,
            plans,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the workflow has a live trigger task.
    #[must_use]
    pub fn is_armed(&self, workflow_id: WorkflowId) -> bool {
        self.handles
            .lock()
            .unwrap()
            .get(&workflow_id)
            .is_some_and(|h| !h.is_finished())
    }

    /// Arms every active scheduled workflow that lacks a live task.
    ///
    /// Active workflows without a schedule node are ignored. Returns the
    /// number of triggers armed by this sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow list cannot be read.
    pub async fn rearm_active(&self) -> Result<usize, TriggerError> {
        let active = self.workflows.list_active().await?;
        let mut armed = 0;

        for workflow in active {
            if self.is_armed(workflow.id) {
                continue;
            }
            let plan_id = self.plans.plan_for(workflow.owner_id).await;
            match ScheduledTrigger::from_workflow(
                &workflow,
                &self.trigger_type_id,
                plan_id,
                Arc::clone(&self.workflows),
                Arc::clone(&self.ledger),
                Arc::clone(&self.queue),
            ) {
                Ok(trigger) => {
                    info!(workflow_id = %workflow.id, "arming schedule trigger");
                    self.handles
                        .lock()
                        .unwrap()
                        .insert(workflow.id, trigger.arm());
                    armed += 1;
                }
                Err(ScheduleError::MissingScheduleTrigger { .. }) => {}
                Err(e) => {
                    warn!(workflow_id = %workflow.id, error = %e, "cannot arm schedule");
                }
            }
        }
        Ok(armed)
    }

    /// Disarms the workflow's trigger, if one is live.
    ///
    /// Returns true if a trigger was found and told to stop.
    pub fn disarm(&self, workflow_id: WorkflowId) -> bool {
        match self.handles.lock().unwrap().remove(&workflow_id) {
            Some(handle) => {
                handle.disarm();
                true
            }
            None => false,
        }
    }
}
