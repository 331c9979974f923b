/// Log directive for the application
pub const LOG_DIRECTIVE: &str = "purgebot=info";

/// Upper bound of the random offset added to every wake-up, in seconds
pub const DEFAULT_JITTER_SECONDS: i64 = 60;

/// How often the admission, deletion and staleness sweeps run, in seconds
pub const DEFAULT_SWEEP_SECONDS: u64 = 60;

/// A task left in `Running` longer than this is considered stuck, in minutes
pub const DEFAULT_STALE_RUNNING_MINUTES: i64 = 30;

/// Largest accepted message age (one year), in minutes
pub const MAX_MESSAGE_AGE_MINUTES: i32 = 525_960;

/// Delay before retrying after the store could not be reached, in seconds
pub const STORE_RETRY_SECONDS: u64 = 60;
