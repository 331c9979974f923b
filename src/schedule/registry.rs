use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use super::error::RecurrenceError;
use super::jitter::Jitter;
use super::recovery::resume;
use super::trigger::Trigger;
use crate::models::{RecurrenceType, Task, TaskId};

/// A task armed in the registry, waiting for its next wake-up
#[derive(Debug, Clone)]
pub struct ArmedEntry {
    pub task_id: TaskId,
    pub recurrence_type: RecurrenceType,
    trigger: Trigger,
    /// Un-jittered instant of the pending firing
    pub scheduled_for: Option<DateTime<Utc>>,
    /// When the driver should wake up for the pending firing
    pub wake_at: Option<DateTime<Utc>>,
}

/// The set of armed entries, keyed by task id
pub struct Registry {
    entries: DashMap<TaskId, ArmedEntry>,
    jitter: Jitter,
    timezone: Tz,
}

impl Registry {
    pub fn new(jitter: Jitter, timezone: Tz) -> Self {
        Self {
            entries: DashMap::new(),
            jitter,
            timezone,
        }
    }

    /// Arm `task`, resuming from `last_fired` when it fired before.
    ///
    /// Returns `Ok(false)` without touching anything if the task is already
    /// armed.
    pub fn add(
        &self,
        task: &Task,
        last_fired: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, RecurrenceError> {
        let vacant = match self.entries.entry(task.id) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(vacant) => vacant,
        };

        let mut trigger = Trigger::for_task(task, self.timezone)?;
        let resumed = resume(&mut trigger, last_fired, now);
        if resumed.discarded > 0 {
            info!(
                task_id = %task.id,
                "Discarded {} missed run(s), replaying the latest at {:?}",
                resumed.discarded,
                resumed.next
            );
        }

        vacant.insert(ArmedEntry {
            task_id: task.id,
            recurrence_type: task.recurrence_type,
            trigger,
            scheduled_for: resumed.next,
            wake_at: self.jitter.apply(resumed.next),
        });
        Ok(true)
    }

    /// Disarm a task. Returns whether it was armed.
    pub fn remove(&self, task_id: TaskId) -> bool {
        self.entries.remove(&task_id).is_some()
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.entries.contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, task_id: TaskId) -> Option<ArmedEntry> {
        self.entries.get(&task_id).map(|entry| entry.clone())
    }

    /// Earliest pending wake-up across all entries
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().filter_map(|entry| entry.wake_at).min()
    }

    /// Entries whose wake-up has elapsed, earliest first
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut due: Vec<(DateTime<Utc>, TaskId)> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.wake_at {
                Some(wake_at) if wake_at <= now => Some((wake_at, entry.task_id)),
                _ => None,
            })
            .collect();
        due.sort();
        due.into_iter().map(|(_, task_id)| task_id).collect()
    }

    /// Consume the pending firing of `task_id` and arm the following one.
    ///
    /// Returns the nominal instant of the consumed firing, or `None` if the
    /// task is not armed or has nothing pending.
    pub fn advance(&self, task_id: TaskId, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut entry = self.entries.get_mut(&task_id)?;
        let fired = entry.scheduled_for?;

        let resumed = resume(&mut entry.trigger, Some(fired), now);
        entry.scheduled_for = resumed.next;
        entry.wake_at = self.jitter.apply(resumed.next);
        Some(fired)
    }

    /// Put back a consumed firing that never got to run, due again at
    /// `retry_at`. The trigger keeps its state, so the following advance
    /// resumes from `fired` exactly as before.
    ///
    /// Leaves the entry untouched and returns `false` if it is not armed or
    /// its pending wake-up already comes first.
    pub fn rewind(&self, task_id: TaskId, fired: DateTime<Utc>, retry_at: DateTime<Utc>) -> bool {
        let Some(mut entry) = self.entries.get_mut(&task_id) else {
            return false;
        };
        if entry.wake_at.is_some_and(|wake_at| wake_at <= retry_at) {
            return false;
        }

        entry.scheduled_for = Some(fired);
        entry.wake_at = self.jitter.apply(Some(retry_at));
        true
    }
}
