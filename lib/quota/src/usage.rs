//! Per-tenant usage counters.
//!
//! Counters are keyed by owner, resource kind, and billing period. They only
//! ever go up; a new billing period starts a fresh counter rather than
//! resetting an old one.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use relay_core::OwnerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::UsageStoreError;

/// The kind of resource a usage counter tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Workflow executions.
    Executions,
    /// Workflows in the `Active` state. Not counted here; the workflow
    /// store owns the count and the guard only compares it to the limit.
    ActiveWorkflows,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executions => write!(f, "executions"),
            Self::ActiveWorkflows => write!(f, "active_workflows"),
        }
    }
}

/// A calendar-month billing period, displayed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    /// The billing period containing the given instant, in UTC.
    #[must_use]
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// The current billing period.
    #[must_use]
    pub fn current() -> Self {
        Self::containing(Utc::now())
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Key identifying a single usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageKey {
    pub owner_id: OwnerId,
    pub resource: ResourceKind,
    pub period: BillingPeriod,
}

impl UsageKey {
    /// A counter key for the current billing period.
    #[must_use]
    pub fn current(owner_id: OwnerId, resource: ResourceKind) -> Self {
        Self {
            owner_id,
            resource,
            period: BillingPeriod::current(),
        }
    }
}

/// Storage backend for usage counters.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Reads a counter. Missing counters read as zero.
    async fn get(&self, key: &UsageKey) -> Result<u64, UsageStoreError>;

    /// Increments a counter by one and returns the new value.
    async fn increment(&self, key: &UsageKey) -> Result<u64, UsageStoreError>;
}

/// In-memory usage store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    counters: Arc<RwLock<HashMap<UsageKey, u64>>>,
}

impl InMemoryUsageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get(&self, key: &UsageKey) -> Result<u64, UsageStoreError> {
        let counters = self.counters.read().unwrap();
        Ok(counters.get(key).copied().unwrap_or(0))
    }

    async fn increment(&self, key: &UsageKey) -> Result<u64, UsageStoreError> {
        let mut counters = self.counters.write().unwrap();
        let count = counters.entry(*key).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

impl Clone for InMemoryUsageStore {
    fn clone(&self) -> Self {
        Self {
            counters: Arc::clone(&self.counters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn billing_period_display() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(BillingPeriod::containing(at).to_string(), "2024-03");
    }

    #[test]
    fn billing_periods_are_distinct_across_months() {
        let march = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
        let april = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert_ne!(
            BillingPeriod::containing(march),
            BillingPeriod::containing(april)
        );
    }

    #[tokio::test]
    async fn missing_counter_reads_zero() {
        let store = InMemoryUsageStore::new();
        let key = UsageKey::current(OwnerId::new(), ResourceKind::Executions);
        assert_eq!(store.get(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_returns_new_value() {
        let store = InMemoryUsageStore::new();
        let key = UsageKey::current(OwnerId::new(), ResourceKind::Executions);

        assert_eq!(store.increment(&key).await.unwrap(), 1);
        assert_eq!(store.increment(&key).await.unwrap(), 2);
        assert_eq!(store.get(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn counters_are_isolated_per_owner() {
        let store = InMemoryUsageStore::new();
        let key_a = UsageKey::current(OwnerId::new(), ResourceKind::Executions);
        let key_b = UsageKey::current(OwnerId::new(), ResourceKind::Executions);

        store.increment(&key_a).await.unwrap();

        assert_eq!(store.get(&key_a).await.unwrap(), 1);
        assert_eq!(store.get(&key_b).await.unwrap(), 0);
    }
}
