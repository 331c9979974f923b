/// Recurring task scheduling
pub mod action;
pub mod error;
pub mod jitter;
pub mod lifecycle;
mod manager;
pub mod recovery;
pub mod registry;
pub mod store;
pub mod trigger;
mod types;

#[cfg(test)]
mod testing;

// Re-export public types and functions
pub use action::{PurgeRequestLog, TaskAction};
pub use error::{RecurrenceError, SchedulerError, StoreError};
pub use lifecycle::{Admission, LifecycleGuard};
pub use manager::{Scheduler, SchedulerHandle, run_firing, start_scheduler};
pub use recovery::RunStateStore;
pub use registry::Registry;
pub use store::TaskStore;
pub use types::{Command, SchedulerConfig};
