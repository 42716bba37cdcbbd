//! The live scheduler capability and its in-process implementation.

use std::sync::{Arc, Mutex, MutexGuard};

use cadence_core::{Clock, CoreError, SystemClock};
use cadence_domain::JobDefinition;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cron_expression::next_fire_after;

/// Register/unregister/list over named jobs. Names are unique: registering an
/// existing name replaces it.
pub trait Scheduler: Send + Sync {
    fn register(&self, job: &JobDefinition) -> Result<(), CoreError>;

    /// Returns whether a job with `name` was present.
    fn unregister(&self, name: &str) -> Result<bool, CoreError>;

    fn list(&self) -> Result<Vec<JobDefinition>, CoreError>;

    fn contains(&self, name: &str) -> Result<bool, CoreError> {
        Ok(self.list()?.iter().any(|job| job.name == name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEntry {
    pub job: JobDefinition,
    /// `None` when the cron string can never fire under a compliant evaluator.
    pub next_fire: Option<DateTime<Utc>>,
}

/// Keeps jobs in memory and computes fire times; running the workers is up to
/// whoever polls [`InProcessScheduler::due`].
pub struct InProcessScheduler {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<ScheduledEntry>>,
}

impl Default for InProcessScheduler {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InProcessScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Result<Vec<ScheduledEntry>, CoreError> {
        Ok(self.state()?.clone())
    }

    pub fn next_fire(&self, name: &str) -> Result<Option<DateTime<Utc>>, CoreError> {
        Ok(self
            .state()?
            .iter()
            .find(|entry| entry.job.name == name)
            .and_then(|entry| entry.next_fire))
    }

    /// Jobs whose fire time has passed, in registration order. Each returned
    /// job is advanced to its next fire time after now.
    pub fn due(&self) -> Result<Vec<JobDefinition>, CoreError> {
        let now = self.clock.now();
        let mut entries = self.state()?;
        let mut due = Vec::new();
        for entry in entries.iter_mut() {
            if entry.next_fire.is_some_and(|at| at <= now) {
                due.push(entry.job.clone());
                entry.next_fire = next_fire_after(&entry.job.cron, now);
            }
        }
        Ok(due)
    }

    fn state(&self) -> Result<MutexGuard<'_, Vec<ScheduledEntry>>, CoreError> {
        self.entries
            .lock()
            .map_err(|_| CoreError::Scheduler("in-process scheduler state poisoned".to_string()))
    }
}

impl Scheduler for InProcessScheduler {
    fn register(&self, job: &JobDefinition) -> Result<(), CoreError> {
        let next_fire = next_fire_after(&job.cron, self.clock.now());
        if next_fire.is_none() {
            warn!(job = %job.name, cron = %job.cron, "cron expression never fires, job kept idle");
        }
        let entry = ScheduledEntry {
            job: job.clone(),
            next_fire,
        };
        let mut entries = self.state()?;
        match entries.iter_mut().find(|existing| existing.job.name == job.name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        debug!(job = %job.name, "job registered with in-process scheduler");
        Ok(())
    }

    fn unregister(&self, name: &str) -> Result<bool, CoreError> {
        let mut entries = self.state()?;
        let before = entries.len();
        entries.retain(|entry| entry.job.name != name);
        Ok(entries.len() != before)
    }

    fn list(&self) -> Result<Vec<JobDefinition>, CoreError> {
        Ok(self.state()?.iter().map(|entry| entry.job.clone()).collect())
    }

    fn contains(&self, name: &str) -> Result<bool, CoreError> {
        Ok(self.state()?.iter().any(|entry| entry.job.name == name))
    }
}
