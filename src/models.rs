use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};
use uuid::Uuid;

/// Identifier of a deletion task
pub type TaskId = Uuid;

/// Lifecycle status of a task, persisted as the `task_status` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "task_status")]
pub enum TaskStatus {
    Adding,
    Scheduled,
    Running,
    Removing,
    Suspended,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Adding => "Adding",
            TaskStatus::Scheduled => "Scheduled",
            TaskStatus::Running => "Running",
            TaskStatus::Removing => "Removing",
            TaskStatus::Suspended => "Suspended",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task recurs, persisted as the `recurrence_type` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "recurrence_type", rename_all = "lowercase")]
pub enum RecurrenceType {
    /// Fires a single time at a Unix timestamp
    Once,
    /// Fires on a fixed interval
    Every,
    /// Fires on a five-field cron expression
    Cron,
}

impl RecurrenceType {
    /// Whether the task goes back to `Scheduled` after a run
    pub fn is_recurring(&self) -> bool {
        matches!(self, RecurrenceType::Every | RecurrenceType::Cron)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceType::Once => "once",
            RecurrenceType::Every => "every",
            RecurrenceType::Cron => "cron",
        }
    }
}

impl std::fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured "delete messages older than X" job for one channel
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub recurrence_type: RecurrenceType,
    /// Cron expression, interval literal or Unix timestamp depending on `recurrence_type`
    pub recurrence_value: String,
    /// Messages older than this many minutes are purged
    pub message_age: i32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
