//! In-memory stores and helpers for scheduler tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::action::TaskAction;
use super::error::StoreError;
use super::recovery::RunStateStore;
use super::store::TaskStore;
use crate::models::{Error, RecurrenceType, Task, TaskId, TaskStatus};

pub fn task(recurrence_type: RecurrenceType, value: &str, status: TaskStatus) -> Task {
    let now = Utc::now();
    Task {
        id: TaskId::new_v4(),
        guild_id: GuildId::new(123_456_789_012_345_678),
        channel_id: ChannelId::new(234_567_890_123_456_789),
        recurrence_type,
        recurrence_value: value.to_string(),
        message_age: 60,
        status,
        created_at: now,
        updated_at: now,
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("injected failure".to_string())
}

/// Task store backed by a map, with switchable failures
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
    pub fail_reads: AtomicBool,
    pub fail_transitions: AtomicBool,
    pub fail_removals: AtomicBool,
    pub transitions: AtomicUsize,
}

impl MemoryTaskStore {
    pub fn with(tasks: &[Task]) -> Self {
        let store = Self::default();
        for task in tasks {
            store.insert(task.clone());
        }
        store
    }

    pub fn insert(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.lock().unwrap().get(&id).map(|task| task.status)
    }

    /// Change a status behind the scheduler's back, as an external actor would
    pub fn set_status(&self, id: TaskId, status: TaskStatus) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&id) {
            task.status = status;
        }
    }

    pub fn set_updated_at(&self, id: TaskId, updated_at: DateTime<Utc>) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&id) {
            task.updated_at = updated_at;
        }
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect())
    }

    async fn find(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn transition(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<bool, StoreError> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&id) {
            Some(task) if task.status == from => {
                task.status = to;
                task.updated_at = Utc::now();
                self.transitions.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, id: TaskId) -> Result<bool, StoreError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.tasks.lock().unwrap().remove(&id).is_some())
    }

    async fn find_stale(
        &self,
        status: TaskStatus,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|task| task.status == status && task.updated_at < updated_before)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryRunState {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    pub fail_writes: AtomicBool,
}

impl MemoryRunState {
    pub fn last_fired(&self, entry_id: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().unwrap().get(entry_id).copied()
    }
}

#[async_trait]
impl RunStateStore for MemoryRunState {
    async fn get(&self, entry_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.last_fired(entry_id))
    }

    async fn set(&self, entry_id: &str, fired_at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.entries
            .lock()
            .unwrap()
            .insert(entry_id.to_string(), fired_at);
        Ok(())
    }

    async fn clear(&self, entry_id: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(entry_id);
        Ok(())
    }
}

/// Action that counts its invocations and can be made to fail
#[derive(Default)]
pub struct CountingAction {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingAction {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskAction for CountingAction {
    async fn execute(&self, _task: &Task) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err("channel is gone".into());
        }
        Ok(())
    }
}
