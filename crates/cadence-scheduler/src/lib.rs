//! cadence-scheduler
//!
//! Lifecycle of the background jobs that materialize obligation occurrences:
//! cron derivation, the live scheduler capability, and the two backing
//! strategies (in-process scheduler + JSON registry, or the OS crontab).

pub mod backend;
pub mod cron_expression;
pub mod crontab;
pub mod lifecycle;
pub mod scheduler;

pub use backend::{JobBackend, RegistryBackend};
pub use cron_expression::{derive_cron, next_fire_after, validate_cron};
pub use crontab::{CommandOutput, CommandRunner, CrontabBackend, SystemCommandRunner};
pub use lifecycle::{CronLifecycleManager, DeleteOutcome, ScheduledJob};
pub use scheduler::{InProcessScheduler, ScheduledEntry, Scheduler};
