use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

use crate::constants::MAX_MESSAGE_AGE_MINUTES;
use crate::models::{Error, Task};

/// The side effect run once a firing has been confirmed `Running`.
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), Error>;
}

/// Hands the purge over to the message-deletion worker by recording the
/// request in the operational log.
pub struct PurgeRequestLog;

#[async_trait]
impl TaskAction for PurgeRequestLog {
    async fn execute(&self, task: &Task) -> Result<(), Error> {
        let age = task.message_age.clamp(0, MAX_MESSAGE_AGE_MINUTES);
        let cutoff = Utc::now() - Duration::minutes(age as i64);

        info!(
            task_id = %task.id,
            guild_id = %task.guild_id,
            channel_id = %task.channel_id,
            cutoff = %cutoff.to_rfc3339(),
            "Purge requested for messages older than {} minutes",
            age
        );
        Ok(())
    }
}
