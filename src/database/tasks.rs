use super::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};

use crate::models::{RecurrenceType, Task, TaskId, TaskStatus};
use crate::schedule::{StoreError, TaskStore};

type TaskRow = (
    TaskId,
    i64,
    i64,
    RecurrenceType,
    String,
    i32,
    TaskStatus,
    DateTime<Utc>,
    DateTime<Utc>,
);

const TASK_COLUMNS: &str = "id, guild_id, channel_id, recurrence_type, recurrence_value, \
     message_age, status, created_at, updated_at";

fn task_from_row(row: TaskRow) -> Task {
    let (
        id,
        guild_id,
        channel_id,
        recurrence_type,
        recurrence_value,
        message_age,
        status,
        created_at,
        updated_at,
    ) = row;

    Task {
        id,
        guild_id: GuildId::new(guild_id as u64),
        channel_id: ChannelId::new(channel_id as u64),
        recurrence_type,
        recurrence_value,
        message_age,
        status,
        created_at,
        updated_at,
    }
}

#[async_trait]
impl TaskStore for Database {
    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE status = $1 ORDER BY created_at",
            TASK_COLUMNS
        ))
        .bind(status)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(task_from_row).collect())
    }

    async fn find(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(task_from_row))
    }

    async fn transition(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, id: TaskId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_stale(
        &self,
        status: TaskStatus,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE status = $1 AND updated_at < $2",
            TASK_COLUMNS
        ))
        .bind(status)
        .bind(updated_before)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(task_from_row).collect())
    }
}
