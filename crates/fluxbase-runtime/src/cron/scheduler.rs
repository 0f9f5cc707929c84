//! The scheduler loop: reconciles the procedure store against the schedule
//! registry on every tick and fires due entries under a bounded concurrency
//! budget, with a small overflow queue absorbing bursts rather than letting
//! an unbounded number of fires pile up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fluxbase_core::config::SchedulerConfig;
use fluxbase_core::observability::Metric;
use fluxbase_core::principal::Principal;
use serde_json::Map;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::observability::ObservabilityState;
use crate::procedure::ProcedureExecutor;

use super::registry::{ScheduledEntry, ScheduleRegistry};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A fire waiting for a concurrency permit, held in the overflow queue.
struct PendingFire {
    namespace: String,
    name: String,
}

/// The running scheduler: one background task ticking the registry against
/// the procedure store and firing due entries through the executor.
pub struct Scheduler {
    registry: ScheduleRegistry,
    executor: ProcedureExecutor,
    observability: ObservabilityState,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    overflow: Arc<Mutex<VecDeque<PendingFire>>>,
    cancellation: CancellationToken,
}

/// A handle to a spawned scheduler: lets the owner stop it and wait for
/// in-flight fires to drain.
pub struct SchedulerHandle {
    cancellation: CancellationToken,
    semaphore: Arc<Semaphore>,
    max_concurrent_fires: usize,
    task: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the tick loop to stop and wait for every in-flight fire to
    /// finish before returning. Already-queued overflow entries are
    /// discarded; they would only have fired after the caller decided to
    /// shut down.
    pub async fn stop(self) {
        self.cancellation.cancel();
        let _ = self.task.await;
        // Acquiring every permit blocks until all currently-running fires
        // have released theirs, which is exactly "drained".
        let _ = self.semaphore.acquire_many(self.max_concurrent_fires as u32).await;
    }
}

impl Scheduler {
    pub fn new(
        registry: ScheduleRegistry,
        executor: ProcedureExecutor,
        observability: ObservabilityState,
        config: SchedulerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_fires));
        Self {
            registry,
            executor,
            observability,
            config,
            semaphore,
            overflow: Arc::new(Mutex::new(VecDeque::new())),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &ScheduleRegistry {
        &self.registry
    }

    /// Spawn the tick loop on a background task and return a handle to
    /// control it.
    pub fn spawn(self) -> SchedulerHandle {
        let cancellation = self.cancellation.clone();
        let semaphore = self.semaphore.clone();
        let max_concurrent_fires = self.config.max_concurrent_fires;

        let task = tokio::spawn(async move {
            self.run().await;
        });

        SchedulerHandle {
            cancellation,
            semaphore,
            max_concurrent_fires,
            task,
        }
    }

    async fn run(self) {
        tracing::info!("scheduler starting");
        let mut interval = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => break,
                _ = interval.tick() => {
                    self.reconcile().await;
                    self.tick().await;
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Bring the registry in line with the current procedure snapshot:
    /// schedule newly-schedulable procedures, unschedule ones that were
    /// disabled or had their schedule cleared.
    async fn reconcile(&self) {
        let now = Utc::now();
        let procedures = self.executor.store().snapshot().await;

        let mut live = std::collections::HashSet::new();
        for procedure in &procedures {
            if !procedure.is_schedulable() {
                continue;
            }
            let key = (procedure.namespace.clone(), procedure.name.clone());
            live.insert(key.clone());

            let expression = procedure.schedule.as_deref().unwrap_or_default();
            let current = self.registry.get(&procedure.namespace, &procedure.name).await;
            if current.as_ref().map(|e| e.expression.as_str()) != Some(expression) {
                if let Err(err) = self
                    .registry
                    .schedule(&procedure.namespace, &procedure.name, expression, now)
                    .await
                {
                    tracing::warn!(
                        namespace = %procedure.namespace,
                        name = %procedure.name,
                        error = %err,
                        "failed to schedule procedure"
                    );
                }
            }
        }

        for entry in self.registry.snapshot().await {
            if !live.contains(&(entry.namespace.clone(), entry.name.clone())) {
                self.registry.unschedule(&entry.namespace, &entry.name).await;
            }
        }
    }

    /// Fire every entry whose `next_run` has passed, respecting the
    /// concurrency budget.
    async fn tick(&self) {
        let now = Utc::now();
        for entry in self.registry.snapshot().await {
            let Some(next_run) = entry.next_run else { continue };
            if next_run > now {
                continue;
            }
            self.registry.record_fire(&entry.namespace, &entry.name, now).await;
            self.dispatch(entry).await;
        }

        self.drain_overflow().await;
    }

    /// Try to fire `entry` immediately; if no permit is free, push it onto
    /// the bounded overflow queue, dropping the oldest pending fire if full.
    async fn dispatch(&self, entry: ScheduledEntry) {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.fire(entry, permit).await;
            }
            Err(_) => {
                let mut overflow = self.overflow.lock().await;
                if overflow.len() >= self.config.overflow_queue_depth {
                    overflow.pop_front();
                    self.observability
                        .record(Metric::counter("scheduler_overflow_dropped_total", 1.0))
                        .await;
                }
                overflow.push_back(PendingFire {
                    namespace: entry.namespace,
                    name: entry.name,
                });
            }
        }
    }

    /// Drain as many overflow entries as there are free permits.
    async fn drain_overflow(&self) {
        loop {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            let pending = {
                let mut overflow = self.overflow.lock().await;
                overflow.pop_front()
            };
            let Some(pending) = pending else {
                drop(permit);
                break;
            };
            let Some(entry) = self.registry.get(&pending.namespace, &pending.name).await else {
                // Unscheduled while it sat in the queue.
                drop(permit);
                continue;
            };
            self.fire(entry, permit).await;
        }
    }

    async fn fire(&self, entry: ScheduledEntry, permit: tokio::sync::OwnedSemaphorePermit) {
        let executor = self.executor.clone();
        let namespace = entry.namespace.clone();
        let name = entry.name.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let principal = Principal::service_role();
            match executor.resolve(&namespace, &name, &principal).await {
                Ok(procedure) => {
                    if let Err(err) = executor
                        .execute_sync(procedure, &principal, Map::new(), CancellationToken::new())
                        .await
                    {
                        tracing::error!(%namespace, %name, error = %err, "scheduled fire failed");
                    }
                }
                Err(err) => {
                    tracing::error!(%namespace, %name, error = %err, "scheduled procedure no longer resolvable");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overflow_queue_drops_oldest_when_full() {
        let overflow: VecDeque<PendingFire> = VecDeque::new();
        let queue = Arc::new(Mutex::new(overflow));
        let depth = 2;

        for i in 0..4 {
            let mut guard = queue.lock().await;
            if guard.len() >= depth {
                guard.pop_front();
            }
            guard.push_back(PendingFire {
                namespace: "default".into(),
                name: format!("job-{i}"),
            });
        }

        let guard = queue.lock().await;
        assert_eq!(guard.len(), depth);
        assert_eq!(guard.front().unwrap().name, "job-2");
        assert_eq!(guard.back().unwrap().name, "job-3");
    }
}
