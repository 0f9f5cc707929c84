//! The scheduled-entry map: a binding from `(namespace, name)` to a single
//! cron entry, guarded by a read/write lock so readers (listing, inspection)
//! never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fluxbase_core::cron::CronSchedule;
use fluxbase_core::error::{FluxbaseError, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A scheduler-local binding from `namespace/name` to an internal cron entry.
/// Exists iff the procedure is enabled with a non-empty schedule.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub expression: String,
    pub next_run: Option<DateTime<Utc>>,
    pub previous_run: Option<DateTime<Utc>>,
}

/// Copy-on-write-friendly scheduled-entry registry: one job per procedure,
/// re-scheduling atomically replaces the old entry so the map never holds
/// stale entries.
#[derive(Clone, Default)]
pub struct ScheduleRegistry {
    entries: Arc<RwLock<HashMap<(String, String), ScheduledEntry>>>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or atomically replace) the schedule for `(namespace, name)`.
    /// The new entry's `next_run` is computed from `now`; its id always
    /// differs from any previous entry for the same key.
    pub async fn schedule(
        &self,
        namespace: &str,
        name: &str,
        expression: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let schedule = CronSchedule::new(expression)
            .map_err(|e| FluxbaseError::Validation(format!("invalid cron expression: {e}")))?;
        let entry = ScheduledEntry {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            expression: schedule.expression().to_string(),
            next_run: schedule.next_after(now),
            previous_run: None,
        };
        let id = entry.id;
        let mut guard = self.entries.write().await;
        guard.insert((namespace.to_string(), name.to_string()), entry);
        Ok(id)
    }

    /// Remove the entry for `(namespace, name)`. A no-op if absent.
    pub async fn unschedule(&self, namespace: &str, name: &str) {
        let mut guard = self.entries.write().await;
        guard.remove(&(namespace.to_string(), name.to_string()));
    }

    pub async fn is_scheduled(&self, namespace: &str, name: &str) -> bool {
        let guard = self.entries.read().await;
        guard.contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Option<ScheduledEntry> {
        let guard = self.entries.read().await;
        guard.get(&(namespace.to_string(), name.to_string())).cloned()
    }

    /// All current entries, for the scheduler's tick loop and for
    /// observability.
    pub async fn snapshot(&self) -> Vec<ScheduledEntry> {
        let guard = self.entries.read().await;
        guard.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Record that an entry fired at `fired_at`, advancing its `next_run`.
    pub async fn record_fire(&self, namespace: &str, name: &str, fired_at: DateTime<Utc>) {
        let mut guard = self.entries.write().await;
        if let Some(entry) = guard.get_mut(&(namespace.to_string(), name.to_string())) {
            if let Ok(schedule) = CronSchedule::new(&entry.expression) {
                entry.previous_run = Some(fired_at);
                entry.next_run = schedule.next_after(fired_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schedule_then_unschedule_round_trips() {
        let registry = ScheduleRegistry::new();
        let now = Utc::now();
        registry.schedule("default", "nightly", "* * * * *", now).await.unwrap();
        assert!(registry.is_scheduled("default", "nightly").await);

        registry.unschedule("default", "nightly").await;
        assert!(!registry.is_scheduled("default", "nightly").await);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_entry_with_a_new_id() {
        let registry = ScheduleRegistry::new();
        let now = Utc::now();
        let first = registry.schedule("default", "job", "* * * * *", now).await.unwrap();
        let second = registry.schedule("default", "job", "*/5 * * * *", now).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unschedule_of_absent_key_is_a_no_op() {
        let registry = ScheduleRegistry::new();
        registry.unschedule("default", "missing").await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn rejects_invalid_expression() {
        let registry = ScheduleRegistry::new();
        assert!(registry.schedule("default", "bad", "not a cron", Utc::now()).await.is_err());
    }
}
