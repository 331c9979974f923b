use super::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::schedule::{RunStateStore, StoreError};

#[async_trait]
impl RunStateStore for Database {
    async fn get(&self, entry_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT last_fire_at FROM schedule_state WHERE entry_id = $1")
                .bind(entry_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(|(last_fire_at,)| last_fire_at))
    }

    async fn set(&self, entry_id: &str, fired_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO schedule_state (entry_id, last_fire_at, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (entry_id)
            DO UPDATE SET last_fire_at = $2, updated_at = NOW()
            "#,
        )
        .bind(entry_id)
        .bind(fired_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn clear(&self, entry_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM schedule_state WHERE entry_id = $1")
            .bind(entry_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
