//! Missed-run recovery.
//!
//! The driver records the nominal instant of every firing it dispatches. When
//! an entry is re-armed after downtime, the trigger resumes from that instant
//! and only the most recent occurrence that fell inside the downtime is kept.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::error::StoreError;
use super::trigger::Trigger;
use crate::models::TaskId;

/// Durable "last scheduled fire instant" per registry entry.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    async fn get(&self, entry_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
    async fn set(&self, entry_id: &str, fired_at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn clear(&self, entry_id: &str) -> Result<(), StoreError>;
}

/// Key of a task's registry entry in the run-state store
pub fn entry_id(task_id: TaskId) -> String {
    format!("task:{}", task_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resumed {
    /// Nominal instant the entry should fire next
    pub next: Option<DateTime<Utc>>,
    /// Missed occurrences dropped in favour of `next`
    pub discarded: u64,
}

/// Compute the next nominal fire instant of `trigger` given the last fired
/// instant. If that instant is already in the past, collapse every missed
/// occurrence into the most recent one so it fires exactly once.
pub fn resume(
    trigger: &mut Trigger,
    last_fired: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Resumed {
    let Some(mut candidate) = trigger.next_after(last_fired, now) else {
        return Resumed {
            next: None,
            discarded: 0,
        };
    };

    if candidate > now {
        return Resumed {
            next: Some(candidate),
            discarded: 0,
        };
    }

    let mut discarded = 0;

    if let Some(interval) = trigger.interval() {
        let step = interval.num_milliseconds();
        let behind = (now - candidate).num_milliseconds();
        let skipped = behind / step;
        if skipped > 0 {
            let caught_up = step
                .checked_mul(skipped)
                .and_then(Duration::try_milliseconds)
                .and_then(|offset| candidate.checked_add_signed(offset));
            if let Some(caught_up) = caught_up {
                candidate = caught_up;
                discarded = skipped as u64;
            }
        }
        return Resumed {
            next: Some(candidate),
            discarded,
        };
    }

    loop {
        match trigger.next_after(Some(candidate), now) {
            Some(following) if following <= now => {
                candidate = following;
                discarded += 1;
            }
            _ => break,
        }
    }

    Resumed {
        next: Some(candidate),
        discarded,
    }
}
