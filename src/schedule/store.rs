use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreError;
use crate::models::{Task, TaskId, TaskStatus};

/// Persistence of tasks and their status column.
///
/// The status column is the only coordination point between concurrent
/// firings, so every status write goes through [`TaskStore::transition`].
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;

    async fn find(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Atomically move `id` from `from` to `to`, bumping `updated_at`.
    /// Returns `false` when the task is gone or no longer in `from`.
    async fn transition(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<bool, StoreError>;

    /// Delete the task record. Returns `false` if it was already gone.
    async fn remove(&self, id: TaskId) -> Result<bool, StoreError>;

    /// Tasks in `status` whose `updated_at` is older than `updated_before`
    async fn find_stale(
        &self,
        status: TaskStatus,
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError>;
}
