use super::Database;
use sqlx::Error as SqlxError;

impl Database {
    /// Run database migrations to create tables
    pub(super) async fn run_migrations(&self) -> Result<(), SqlxError> {
        self.create_task_types().await?;
        self.create_tasks_table().await?;
        self.create_schedule_state_table().await?;
        Ok(())
    }

    async fn create_task_types(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            DO $$ BEGIN
                CREATE TYPE task_status AS ENUM ('Adding', 'Scheduled', 'Running', 'Removing', 'Suspended');
            EXCEPTION
                WHEN duplicate_object THEN null;
            END $$;
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"
            DO $$ BEGIN
                CREATE TYPE recurrence_type AS ENUM ('once', 'every', 'cron');
            EXCEPTION
                WHEN duplicate_object THEN null;
            END $$;
            "#,
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn create_tasks_table(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id UUID PRIMARY KEY,
                guild_id BIGINT NOT NULL CHECK (guild_id > 0),
                channel_id BIGINT NOT NULL CHECK (channel_id > 0),
                recurrence_type recurrence_type NOT NULL,
                recurrence_value TEXT NOT NULL,
                message_age INTEGER NOT NULL CHECK (message_age BETWEEN 0 AND 525960),
                status task_status NOT NULL DEFAULT 'Adding',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS tasks_status_idx ON tasks (status)")
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn create_schedule_state_table(&self) -> Result<(), SqlxError> {
        // Last scheduled fire instant per registry entry
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_state (
                entry_id TEXT PRIMARY KEY,
                last_fire_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }
}
