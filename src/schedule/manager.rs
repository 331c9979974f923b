use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use super::action::TaskAction;
use super::error::StoreError;
use super::jitter::Jitter;
use super::lifecycle::{AfterRun, Admission, BeforeRun, CancelReason, LifecycleGuard};
use super::recovery::{RunStateStore, entry_id};
use super::registry::Registry;
use super::store::TaskStore;
use super::types::{Command, SchedulerConfig};
use crate::constants::{DEFAULT_SWEEP_SECONDS, STORE_RETRY_SECONDS};
use crate::models::{Task, TaskId, TaskStatus};

/// Owns the registry and turns elapsed wake-ups into firings
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    run_state: Arc<dyn RunStateStore>,
    action: Arc<dyn TaskAction>,
    registry: Arc<Registry>,
    guard: LifecycleGuard,
    config: SchedulerConfig,
    sweep_every: chrono::Duration,
    in_flight: Arc<DashSet<TaskId>>,
    workers: JoinSet<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        run_state: Arc<dyn RunStateStore>,
        action: Arc<dyn TaskAction>,
        config: SchedulerConfig,
    ) -> Self {
        let registry = Arc::new(Registry::new(Jitter::new(config.jitter), config.timezone));
        let guard = LifecycleGuard::new(
            Arc::clone(&store),
            Arc::clone(&run_state),
            Arc::clone(&registry),
        );
        let sweep_every = chrono::Duration::from_std(config.sweep_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_SWEEP_SECONDS as i64));

        Self {
            store,
            run_state,
            action,
            registry,
            guard,
            config,
            sweep_every,
            in_flight: Arc::new(DashSet::new()),
            workers: JoinSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn guard(&self) -> LifecycleGuard {
        self.guard.clone()
    }

    /// Re-arm every task persisted as `Scheduled`, resuming each from its
    /// recorded fire instant.
    pub async fn bootstrap(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let tasks = self.store.find_by_status(TaskStatus::Scheduled).await?;

        let mut armed = 0;
        for task in &tasks {
            if self.guard.rearm(task, now).await {
                armed += 1;
            }
        }
        Ok(armed)
    }

    pub async fn dispatch(&mut self, command: Command, now: DateTime<Utc>) {
        match command {
            Command::Admit => self.admit_pending(now).await,
            Command::Fire(task_id) => self.fire(task_id, now).await,
            Command::Delete => {
                let removed = self.guard.drain_removing().await;
                if removed > 0 {
                    info!("Removed {} finished task(s)", removed);
                }
            }
            Command::Reap => {
                let stale_before = now - self.config.stale_after;
                let reset = self
                    .guard
                    .reset_stale(stale_before, &self.in_flight, now)
                    .await;
                if reset > 0 {
                    warn!("Reset {} task(s) stuck in Running", reset);
                }
            }
        }
    }

    async fn admit_pending(&self, now: DateTime<Utc>) {
        let tasks = match self.store.find_by_status(TaskStatus::Adding).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Failed to load tasks pending admission: {}", e);
                return;
            }
        };

        let mut scheduled = Vec::new();
        for task in &tasks {
            if self.guard.admit(task, now).await == Admission::Armed {
                scheduled.push(task.id);
            }
        }

        if !scheduled.is_empty() {
            info!(uids = ?scheduled, "Tasks scheduled");
        }
    }

    async fn fire(&mut self, task_id: TaskId, now: DateTime<Utc>) {
        let Some(fired_at) = self.registry.advance(task_id, now) else {
            return;
        };

        let entry_id = entry_id(task_id);
        if let Err(e) = self.run_state.set(&entry_id, fired_at).await {
            error!(
                task_id = %task_id,
                entry_id = %entry_id,
                "Failed to record fire instant: {}", e
            );
        }

        debug!(task_id = %task_id, "Firing run scheduled for {}", fired_at.to_rfc3339());

        let guard = self.guard.clone();
        let action = Arc::clone(&self.action);
        let in_flight = Arc::clone(&self.in_flight);
        let tracked = in_flight.insert(task_id);

        self.workers.spawn(async move {
            run_firing(&guard, action.as_ref(), task_id, fired_at).await;
            if tracked {
                in_flight.remove(&task_id);
            }
        });
    }

    /// Collect workers that already finished
    fn reap_workers(&mut self) {
        while let Some(result) = self.workers.try_join_next() {
            if let Err(e) = result {
                error!("Task worker failed: {}", e);
            }
        }
    }

    /// Wait for every in-flight firing to reach its after-run checkpoint
    pub async fn wait_for_workers(&mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("Task worker failed: {}", e);
            }
        }
    }

    /// Main loop. Runs until `shutdown` broadcasts `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>, wake: Arc<Notify>) {
        info!("Scheduler started");

        loop {
            match self.bootstrap(Utc::now()).await {
                Ok(armed) => {
                    info!("Re-armed {} scheduled task(s)", armed);
                    break;
                }
                Err(e) => {
                    error!("Failed to load scheduled tasks from database: {}", e);
                    tokio::select! {
                        _ = sleep(Duration::from_secs(STORE_RETRY_SECONDS)) => {}
                        _ = shutdown.changed() => {
                            info!("Scheduler stopped");
                            return;
                        }
                    }
                }
            }
        }

        let mut next_sweep = Utc::now();

        loop {
            let now = Utc::now();
            if now >= next_sweep {
                for command in [Command::Admit, Command::Delete, Command::Reap] {
                    self.dispatch(command, now).await;
                }
                next_sweep = now + self.sweep_every;
            }

            for task_id in self.registry.due(now) {
                self.dispatch(Command::Fire(task_id), now).await;
            }
            self.reap_workers();

            let wake_at = self
                .registry
                .next_wake()
                .map_or(next_sweep, |at| at.min(next_sweep));
            let wait = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            // Wait until the next wake-up OR until a task is admitted from outside
            tokio::select! {
                _ = sleep(wait) => {}
                _ = wake.notified() => {
                    debug!("Admission signal received, recomputing next wake-up");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        }

        self.wait_for_workers().await;
        info!("Scheduler stopped");
    }
}

/// One firing: before-run checkpoint, action, after-run checkpoint.
///
/// A firing cancelled because the store could not be read or written is put
/// back in the registry and retried after [`STORE_RETRY_SECONDS`].
pub async fn run_firing(
    guard: &LifecycleGuard,
    action: &dyn TaskAction,
    task_id: TaskId,
    fired_at: DateTime<Utc>,
) -> Option<AfterRun> {
    let task = match guard.before_run(task_id).await {
        Ok(BeforeRun::Proceed(task)) => task,
        Ok(BeforeRun::Cancelled(
            reason @ (CancelReason::StoreUnavailable | CancelReason::PersistFailed),
        )) => {
            warn!(task_id = %task_id, "Firing cancelled: {:?}", reason);
            let retry_at = Utc::now() + chrono::Duration::seconds(STORE_RETRY_SECONDS as i64);
            guard.retry_later(task_id, fired_at, retry_at);
            return None;
        }
        Ok(BeforeRun::Cancelled(reason)) => {
            debug!(task_id = %task_id, "Firing cancelled: {:?}", reason);
            return None;
        }
        Err(e) => {
            error!(task_id = %task_id, "Firing cancelled: {}", e);
            return None;
        }
    };

    let outcome = action.execute(&task).await;

    match guard.after_run(task_id, &outcome).await {
        Ok(after) => {
            debug!(task_id = %task_id, "Run finished: {:?}", after);
            Some(after)
        }
        Err(e) => {
            error!(task_id = %task_id, "{}", e);
            None
        }
    }
}

/// Handle for external actors while the scheduler loop runs
pub struct SchedulerHandle {
    guard: LifecycleGuard,
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Move an `Adding` task into the schedule right away instead of
    /// waiting for the next admission sweep.
    pub async fn admit(&self, task: &Task) -> Admission {
        let admission = self.guard.admit(task, Utc::now()).await;
        if admission == Admission::Armed {
            self.wake.notify_one();
        }
        admission
    }

    /// Stop the loop and wait for in-flight firings to complete
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Scheduler task failed: {}", e);
        }
    }
}

/// Spawn the scheduler loop
pub fn start_scheduler(
    store: Arc<dyn TaskStore>,
    run_state: Arc<dyn RunStateStore>,
    action: Arc<dyn TaskAction>,
    config: SchedulerConfig,
) -> SchedulerHandle {
    let scheduler = Scheduler::new(store, run_state, action, config);
    let guard = scheduler.guard();
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(scheduler.run(shutdown_rx, Arc::clone(&wake)));

    SchedulerHandle {
        guard,
        wake,
        shutdown: shutdown_tx,
        task,
    }
}
