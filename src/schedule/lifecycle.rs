//! Status checkpoints around every firing.
//!
//! The persisted status is the source of truth for "is this task currently
//! executing": `before_run` only lets a firing through after it has moved the
//! task from `Scheduled` to `Running` in the store, and `after_run` moves it
//! back (or on to `Removing`) once the action has completed.

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::{Checkpoint, Result, SchedulerError};
use super::recovery::{RunStateStore, entry_id};
use super::registry::Registry;
use super::store::TaskStore;
use crate::models::{Error, RecurrenceType, Task, TaskId, TaskStatus};

/// Result of trying to admit an `Adding` task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Armed,
    AlreadyArmed,
    /// The task is not in `Adding`
    NotAdding(TaskStatus),
    /// The recurrence value does not parse; the task stays in `Adding`
    Rejected,
    /// The status write failed; the task stays in `Adding`
    PersistFailed,
    /// The task left `Adding` before the status write landed
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    NotFound,
    /// A previous firing has not completed yet
    AlreadyRunning,
    /// Another checkpoint moved the task out of `Scheduled` first
    LostRace,
    Suspended,
    Removed,
    RemovalFailed,
    StoreUnavailable,
    PersistFailed,
    InvariantViolation,
}

#[derive(Debug, Clone)]
pub enum BeforeRun {
    /// The task is now `Running` and the action may execute
    Proceed(Task),
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterRun {
    Rescheduled,
    MarkedForRemoval,
    /// Status was changed by someone else during execution
    Deferred(TaskStatus),
    Missing,
    PersistFailed,
}

#[derive(Clone)]
pub struct LifecycleGuard {
    store: Arc<dyn TaskStore>,
    run_state: Arc<dyn RunStateStore>,
    registry: Arc<Registry>,
}

impl LifecycleGuard {
    pub fn new(
        store: Arc<dyn TaskStore>,
        run_state: Arc<dyn RunStateStore>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            store,
            run_state,
            registry,
        }
    }

    /// Arm an `Adding` task and persist it as `Scheduled`.
    pub async fn admit(&self, task: &Task, now: DateTime<Utc>) -> Admission {
        if task.status != TaskStatus::Adding {
            return Admission::NotAdding(task.status);
        }

        match self.registry.add(task, None, now) {
            Ok(true) => {}
            Ok(false) => {
                debug!(task_id = %task.id, "Task already armed, skipping admission");
                return Admission::AlreadyArmed;
            }
            Err(e) => {
                warn!(task_id = %task.id, "Task stays in Adding: {}", e);
                return Admission::Rejected;
            }
        }

        match self
            .store
            .transition(task.id, TaskStatus::Adding, TaskStatus::Scheduled)
            .await
        {
            Ok(true) => Admission::Armed,
            Ok(false) => {
                warn!(task_id = %task.id, "Task left Adding during admission, disarming");
                self.registry.remove(task.id);
                Admission::Superseded
            }
            Err(e) => {
                error!(
                    task_id = %task.id,
                    "Error updating task status to {}: {}",
                    TaskStatus::Scheduled,
                    e
                );
                self.registry.remove(task.id);
                Admission::PersistFailed
            }
        }
    }

    /// Decide whether a due firing may execute.
    pub async fn before_run(&self, task_id: TaskId) -> Result<BeforeRun> {
        let task = match self.store.find(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                info!(task_id = %task_id, "Task no longer exists, disarming");
                self.deregister(task_id).await;
                return Ok(BeforeRun::Cancelled(CancelReason::NotFound));
            }
            Err(e) => {
                error!(task_id = %task_id, "Failed to load task before run: {}", e);
                return Ok(BeforeRun::Cancelled(CancelReason::StoreUnavailable));
            }
        };

        match task.status {
            TaskStatus::Scheduled => {}
            TaskStatus::Removing => {
                if let Err(e) = self.store.remove(task_id).await {
                    error!(task_id = %task_id, "Error removing task: {}", e);
                    return Ok(BeforeRun::Cancelled(CancelReason::RemovalFailed));
                }
                info!(task_id = %task_id, "Task removed");
                self.deregister(task_id).await;
                return Ok(BeforeRun::Cancelled(CancelReason::Removed));
            }
            TaskStatus::Suspended => {
                info!(task_id = %task_id, "Task suspended, disarming");
                self.deregister(task_id).await;
                return Ok(BeforeRun::Cancelled(CancelReason::Suspended));
            }
            TaskStatus::Running => {
                debug!(task_id = %task_id, "Previous run still in progress, skipping");
                return Ok(BeforeRun::Cancelled(CancelReason::AlreadyRunning));
            }
            TaskStatus::Adding => {
                return Err(SchedulerError::InvariantViolation {
                    task_id,
                    checkpoint: Checkpoint::BeforeRun,
                    status: task.status,
                });
            }
        }

        match self
            .store
            .transition(task_id, TaskStatus::Scheduled, TaskStatus::Running)
            .await
        {
            Ok(true) => Ok(BeforeRun::Proceed(Task {
                status: TaskStatus::Running,
                ..task
            })),
            Ok(false) => {
                debug!(task_id = %task_id, "Task left Scheduled concurrently, skipping");
                Ok(BeforeRun::Cancelled(CancelReason::LostRace))
            }
            Err(e) => {
                error!(
                    task_id = %task_id,
                    "Error updating task status to {}: {}",
                    TaskStatus::Running,
                    e
                );
                Ok(BeforeRun::Cancelled(CancelReason::PersistFailed))
            }
        }
    }

    /// Advance the status once the action has completed, successfully or not.
    pub async fn after_run(
        &self,
        task_id: TaskId,
        outcome: &std::result::Result<(), Error>,
    ) -> Result<AfterRun> {
        if let Err(e) = outcome {
            warn!(task_id = %task_id, "Task action failed: {}", e);
        }

        let task = match self.store.find(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(task_id = %task_id, "Task deleted while running, disarming");
                self.deregister(task_id).await;
                return Ok(AfterRun::Missing);
            }
            Err(e) => {
                error!(
                    task_id = %task_id,
                    "Failed to load task after run, it stays Running: {}", e
                );
                return Ok(AfterRun::PersistFailed);
            }
        };

        let next = match task.status {
            TaskStatus::Running => match task.recurrence_type {
                RecurrenceType::Cron | RecurrenceType::Every => TaskStatus::Scheduled,
                RecurrenceType::Once => TaskStatus::Removing,
            },
            TaskStatus::Suspended | TaskStatus::Removing => {
                debug!(task_id = %task_id, "Status changed to {} during run", task.status);
                return Ok(AfterRun::Deferred(task.status));
            }
            TaskStatus::Adding | TaskStatus::Scheduled => {
                return Err(SchedulerError::InvariantViolation {
                    task_id,
                    checkpoint: Checkpoint::AfterRun,
                    status: task.status,
                });
            }
        };

        match self
            .store
            .transition(task_id, TaskStatus::Running, next)
            .await
        {
            Ok(true) if next == TaskStatus::Removing => {
                self.registry.remove(task_id);
                Ok(AfterRun::MarkedForRemoval)
            }
            Ok(true) => Ok(AfterRun::Rescheduled),
            Ok(false) => {
                let current = self.store.find(task_id).await.ok().flatten();
                match current {
                    Some(task) => Ok(AfterRun::Deferred(task.status)),
                    None => {
                        self.deregister(task_id).await;
                        Ok(AfterRun::Missing)
                    }
                }
            }
            Err(e) => {
                error!(
                    task_id = %task_id,
                    "Error updating task status to {}, task stays Running: {}",
                    next,
                    e
                );
                Ok(AfterRun::PersistFailed)
            }
        }
    }

    /// Delete every task record waiting in `Removing`. Returns how many went.
    pub async fn drain_removing(&self) -> usize {
        let tasks = match self.store.find_by_status(TaskStatus::Removing).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Failed to load tasks pending removal: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for task in tasks {
            match self.store.remove(task.id).await {
                Ok(_) => {
                    self.deregister(task.id).await;
                    removed += 1;
                }
                Err(e) => error!(task_id = %task.id, "Error removing task: {}", e),
            }
        }
        removed
    }

    /// Release tasks stuck in `Running` since before `updated_before`.
    ///
    /// Recurring tasks go back to `Scheduled` and are re-armed; one-shot
    /// tasks are treated as consumed and moved to `Removing`. Tasks with a
    /// firing in flight in this process are left alone.
    pub async fn reset_stale(
        &self,
        updated_before: DateTime<Utc>,
        in_flight: &DashSet<TaskId>,
        now: DateTime<Utc>,
    ) -> usize {
        let tasks = match self
            .store
            .find_stale(TaskStatus::Running, updated_before)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Failed to load stale running tasks: {}", e);
                return 0;
            }
        };

        let mut reset = 0;
        for task in tasks {
            if in_flight.contains(&task.id) {
                continue;
            }

            let target = if task.recurrence_type.is_recurring() {
                TaskStatus::Scheduled
            } else {
                TaskStatus::Removing
            };

            match self
                .store
                .transition(task.id, TaskStatus::Running, target)
                .await
            {
                Ok(true) => {
                    warn!(
                        task_id = %task.id,
                        "Task stuck in Running since {}, reset to {}",
                        task.updated_at.to_rfc3339(),
                        target
                    );
                    reset += 1;
                    if target == TaskStatus::Scheduled {
                        self.rearm(&task, now).await;
                    } else {
                        self.registry.remove(task.id);
                    }
                }
                Ok(false) => {}
                Err(e) => error!(
                    task_id = %task.id,
                    "Error updating task status to {}: {}", target, e
                ),
            }
        }
        reset
    }

    /// Arm a `Scheduled` task, resuming from its recorded fire instant.
    pub async fn rearm(&self, task: &Task, now: DateTime<Utc>) -> bool {
        let entry_id = entry_id(task.id);
        let last_fired = match self.run_state.get(&entry_id).await {
            Ok(last_fired) => last_fired,
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    entry_id = %entry_id,
                    "Failed to read last fire instant, starting fresh: {}", e
                );
                None
            }
        };

        match self.registry.add(task, last_fired, now) {
            Ok(armed) => armed,
            Err(e) => {
                error!(task_id = %task.id, "Scheduled task has an invalid recurrence: {}", e);
                false
            }
        }
    }

    /// Re-arm a firing whose before-run checkpoint could not reach the store,
    /// so it runs again at `retry_at` instead of being lost.
    pub fn retry_later(&self, task_id: TaskId, fired: DateTime<Utc>, retry_at: DateTime<Utc>) {
        if self.registry.rewind(task_id, fired, retry_at) {
            info!(
                task_id = %task_id,
                "Run scheduled for {} will be retried at {}",
                fired.to_rfc3339(),
                retry_at.to_rfc3339()
            );
        }
    }

    async fn deregister(&self, task_id: TaskId) {
        self.registry.remove(task_id);

        let entry_id = entry_id(task_id);
        if let Err(e) = self.run_state.clear(&entry_id).await {
            warn!(
                task_id = %task_id,
                entry_id = %entry_id,
                "Failed to clear last fire instant: {}", e
            );
        }
    }
}
