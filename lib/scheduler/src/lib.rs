//! Trigger scheduling for the relay workflow engine.
//!
//! Two paths feed the job queue: cron-style [`trigger`]s that sleep
//! until their next fire time and re-arm themselves, and a periodic
//! [`poller`] sweep that asks polling capabilities for new external
//! data. Both re-verify the workflow is still active before enqueuing.

pub mod config;
pub mod error;
pub mod plans;
pub mod poller;
pub mod schedule;
pub mod trigger;

pub use config::{PollerConfig, SchedulerConfig};
pub use error::{ScheduleError, TriggerError};
pub use plans::{PlanResolver, StaticPlanResolver};
pub use poller::{PollingSweeper, SweeperHandle};
pub use schedule::CronSchedule;
pub use trigger::{
    FireOutcome, ScheduleSupervisor, ScheduledTrigger, TriggerHandle, TriggerState,
};
