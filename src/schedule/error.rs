use thiserror::Error;

use crate::models::{TaskId, TaskStatus};

/// A recurrence value that does not match its recurrence type's grammar.
#[derive(Debug, Error)]
pub enum RecurrenceError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    Cron { expression: String, reason: String },

    #[error("Invalid interval '{value}': {reason}")]
    Interval { value: String, reason: String },

    #[error("Invalid Unix timestamp '{0}'")]
    Timestamp(String),
}

/// Failure reaching or writing the task store or the run-state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Where in a firing a status was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BeforeRun,
    AfterRun,
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Checkpoint::BeforeRun => f.write_str("before-run"),
            Checkpoint::AfterRun => f.write_str("after-run"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A status the state machine rules out at this checkpoint. Indicates
    /// corrupted state rather than a transient fault.
    #[error("Invariant violation: task {task_id} has status {status} at {checkpoint}")]
    InvariantViolation {
        task_id: TaskId,
        checkpoint: Checkpoint,
        status: TaskStatus,
    },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
