//! Scheduling and deletion of the jobs behind recurring obligations.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use cadence_core::{CoreError, ObligationStore, PayrollSource, RecurrenceExpander};
use cadence_domain::{JobDefinition, JobState, Obligation};
use cadence_storage_json::PayrollChecker;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{backend::JobBackend, cron_expression::derive_cron};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub cron_expression: String,
    pub unique_id: String,
    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(String),
    /// No obligation mapped the job id, or no active job had its unique id.
    NotFound,
}

impl DeleteOutcome {
    pub fn unique_id(&self) -> Option<&str> {
        match self {
            DeleteOutcome::Deleted(unique_id) => Some(unique_id),
            DeleteOutcome::NotFound => None,
        }
    }
}

pub struct CronLifecycleManager {
    backend: Box<dyn JobBackend>,
    store: Arc<dyn ObligationStore>,
    scripts_dir: PathBuf,
}

impl CronLifecycleManager {
    pub fn new(
        backend: impl JobBackend + 'static,
        store: Arc<dyn ObligationStore>,
        scripts_dir: PathBuf,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            store,
            scripts_dir,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn script_path(&self, unique_id: &str) -> PathBuf {
        self.scripts_dir.join(unique_id)
    }

    /// Fresh `<kind>-<uuid>` name for a job.
    pub fn allocate_unique_id(obligation: &Obligation) -> String {
        format!("{}-{}", obligation.kind.slug(), Uuid::new_v4())
    }

    /// Derives the cron string, writes the empty script artifact and activates
    /// the job. On failure nothing stays behind.
    pub fn schedule(&self, obligation: &Obligation) -> Result<ScheduledJob, CoreError> {
        RecurrenceExpander::validate(obligation)?;
        let cron_expression = derive_cron(obligation);
        let unique_id = Self::allocate_unique_id(obligation);
        let state = JobState::Pending;

        let script_path = self.create_script(&unique_id)?;
        let job = JobDefinition::new(&unique_id, &cron_expression, script_path.clone())
            .with_worker_data(serde_json::to_value(obligation)?);
        if let Err(err) = self.backend.activate(&job) {
            error!(operation = "schedule", job = %unique_id, error = %err, "activation failed");
            if let Err(cleanup) = remove_script(&script_path) {
                warn!(job = %unique_id, error = %cleanup, "failed to remove script artifact");
            }
            return Err(err);
        }

        let state = state.transition(JobState::Active)?;
        info!(
            job = %unique_id,
            cron = %cron_expression,
            title = %obligation.title,
            "job scheduled"
        );
        Ok(ScheduledJob {
            cron_expression,
            unique_id,
            state,
        })
    }

    /// Deactivates the job the store maps `job_id` to and removes its script.
    /// Once deactivated the job counts as deleted; a script that cannot be
    /// removed is only logged.
    pub fn delete(&self, job_id: &str) -> Result<DeleteOutcome, CoreError> {
        let unique_id = match self.store.unique_id_for(job_id).inspect_err(|err| {
            error!(operation = "delete", job_id, error = %err, "obligation lookup failed")
        })? {
            Some(unique_id) => unique_id,
            None => {
                info!(job_id, "no obligation for job id");
                return Ok(DeleteOutcome::NotFound);
            }
        };

        let deactivated = self.backend.deactivate(&unique_id).inspect_err(|err| {
            error!(operation = "delete", job = %unique_id, error = %err, "deactivation failed")
        })?;
        if !deactivated {
            info!(job_id, job = %unique_id, "job was not active");
            return Ok(DeleteOutcome::NotFound);
        }

        let script_path = self.script_path(&unique_id);
        if let Err(err) = remove_script(&script_path) {
            warn!(
                job = %unique_id,
                path = %script_path.display(),
                error = %err,
                "job deactivated but its script artifact remains"
            );
        }
        JobState::Active.transition(JobState::Deleted)?;
        info!(job_id, job = %unique_id, "job deleted");
        Ok(DeleteOutcome::Deleted(unique_id))
    }

    /// Brings the payroll checker jobs in line with `source` on the active
    /// backend. Returns how many checkers are active.
    pub fn sync_payroll_checkers(
        &self,
        source: &dyn PayrollSource,
        checker: &PayrollChecker,
    ) -> Result<usize, CoreError> {
        let active = self
            .backend
            .sync_payroll_checkers(source, checker)
            .inspect_err(|err| {
                error!(operation = "sync_payroll_checkers", error = %err, "payroll sync failed")
            })?;
        info!(payroll_checkers = active, "payroll checkers synced");
        Ok(active)
    }

    fn create_script(&self, unique_id: &str) -> Result<PathBuf, CoreError> {
        let path = self.script_path(unique_id);
        fs::create_dir_all(&self.scripts_dir)
            .and_then(|()| File::create(&path).map(drop))
            .map_err(|err| CoreError::persistence_at(&path, err))?;
        Ok(path)
    }
}

fn remove_script(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
