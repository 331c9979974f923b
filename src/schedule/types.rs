use chrono::Duration;
use chrono_tz::Tz;

use crate::constants::{DEFAULT_JITTER_SECONDS, DEFAULT_STALE_RUNNING_MINUTES, DEFAULT_SWEEP_SECONDS};
use crate::models::TaskId;

/// Work items dispatched by the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Arm every task waiting in `Adding`
    Admit,
    /// Run the due firing of one armed task
    Fire(TaskId),
    /// Delete task records waiting in `Removing`
    Delete,
    /// Release tasks stuck in `Running`
    Reap,
}

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Timezone cron expressions are evaluated in
    pub timezone: Tz,
    /// Upper bound of the random delay added to each wake-up
    pub jitter: Duration,
    /// Period of the admission, deletion and staleness sweeps
    pub sweep_interval: std::time::Duration,
    /// How long a task may stay `Running` before it is reset
    pub stale_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            jitter: Duration::seconds(DEFAULT_JITTER_SECONDS),
            sweep_interval: std::time::Duration::from_secs(DEFAULT_SWEEP_SECONDS),
            stale_after: Duration::minutes(DEFAULT_STALE_RUNNING_MINUTES),
        }
    }
}
