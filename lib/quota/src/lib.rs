//! Plan limits and per-tenant usage accounting.
//!
//! Quota enforcement is split in two halves: a read-only check before an
//! execution record exists, and an increment after the execution reaches a
//! terminal state. Keeping the halves apart is what lets a redelivered job
//! be answered from the ledger without touching the counters again.

pub mod error;
pub mod guard;
pub mod limits;
pub mod usage;

pub use error::{QuotaError, UsageStoreError};
pub use guard::QuotaGuard;
pub use limits::{PlanCatalog, PlanLimits};
pub use usage::{BillingPeriod, InMemoryUsageStore, ResourceKind, UsageKey, UsageStore};
