//! cadence-storage-json
//!
//! File-backed job registry: a pretty-printed JSON array of job definitions,
//! replaced wholesale under an exclusive lock file on every mutation.

pub mod lock;

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use cadence_core::{CoreError, PayrollSource};
use cadence_domain::JobDefinition;
use tracing::{debug, error, info};
use uuid::Uuid;

pub use lock::{MutationLock, DEFAULT_STALE_AFTER};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PAYROLL_CHECKER_CRON: &str = "0 0 1 */1 *";
const LOCK_EXTENSION: &str = "lock";
const TMP_SUFFIX: &str = "tmp";

/// Ordered, in-memory view of the registry between a load and a flush.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    jobs: Vec<JobDefinition>,
    dirty: bool,
}

impl Registry {
    pub fn from_jobs(jobs: Vec<JobDefinition>) -> Self {
        Self { jobs, dirty: false }
    }

    pub fn jobs(&self) -> &[JobDefinition] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<JobDefinition> {
        self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.name.as_str())
    }

    /// Inserts `job`, replacing any entry with the same name in place so a name
    /// appears at most once. Returns the replaced entry.
    pub fn upsert(&mut self, job: JobDefinition) -> Option<JobDefinition> {
        self.dirty = true;
        match self.jobs.iter_mut().find(|existing| existing.name == job.name) {
            Some(existing) => Some(std::mem::replace(existing, job)),
            None => {
                self.jobs.push(job);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<JobDefinition> {
        let index = self.jobs.iter().position(|job| job.name == name)?;
        self.dirty = true;
        Some(self.jobs.remove(index))
    }

    /// Keeps only jobs matching `keep`, returning how many were dropped.
    pub fn retain(&mut self, keep: impl FnMut(&JobDefinition) -> bool) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(keep);
        let removed = before - self.jobs.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn replace_all(&mut self, jobs: Vec<JobDefinition>) {
        self.jobs = jobs;
        self.dirty = true;
    }

    /// Forces the next flush even when no entry changed.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Debug, Clone)]
pub struct RegistryPaths {
    pub registry_file: PathBuf,
    pub lock_file: PathBuf,
}

impl RegistryPaths {
    /// Registry file with its lock file alongside (`jobs.json.lock`).
    pub fn beside(registry_file: PathBuf) -> Self {
        let lock_file = with_appended_extension(&registry_file, LOCK_EXTENSION);
        Self {
            registry_file,
            lock_file,
        }
    }
}

/// Schedule and script shared by every per-employee payroll checker job.
#[derive(Debug, Clone)]
pub struct PayrollChecker {
    pub cron: String,
    pub script_path: PathBuf,
}

impl PayrollChecker {
    pub fn new(script_path: PathBuf) -> Self {
        Self {
            cron: DEFAULT_PAYROLL_CHECKER_CRON.to_string(),
            script_path,
        }
    }
}

/// JSON persistence for the job registry.
#[derive(Debug, Clone)]
pub struct JsonJobRegistry {
    paths: RegistryPaths,
    lock_timeout: Duration,
    stale_lock_after: Duration,
}

impl JsonJobRegistry {
    pub fn new(paths: RegistryPaths) -> Self {
        Self {
            paths,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Age after which a leftover lock file is broken regardless of its holder.
    pub fn with_stale_lock_after(mut self, stale_lock_after: Duration) -> Self {
        self.stale_lock_after = stale_lock_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.paths.registry_file
    }

    pub fn lock_path(&self) -> &Path {
        &self.paths.lock_file
    }

    /// Reads the snapshot. A missing file is an empty registry; unreadable or
    /// malformed content is a persistence error.
    pub fn load(&self) -> Result<Registry, CoreError> {
        let path = self.path();
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "registry file missing, starting empty");
                return Ok(Registry::default());
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to read job registry");
                return Err(CoreError::persistence_at(path, err));
            }
        };
        let jobs: Vec<JobDefinition> = serde_json::from_str(&data).map_err(|err| {
            error!(path = %path.display(), error = %err, "job registry is corrupt");
            CoreError::persistence_at(path, err)
        })?;
        Ok(Registry::from_jobs(jobs))
    }

    /// Overwrites the registry with `jobs` under the mutation lock.
    pub fn save(&self, jobs: &[JobDefinition]) -> Result<(), CoreError> {
        let _guard = self.lock()?;
        self.write_snapshot(jobs)
    }

    pub fn lock(&self) -> Result<MutationLock, CoreError> {
        MutationLock::acquire_with(self.lock_path(), self.lock_timeout, self.stale_lock_after)
    }

    /// Runs `apply` against a freshly loaded registry while holding the lock and
    /// flushes the result if it changed. The lock is released on every path.
    pub fn mutate<T>(
        &self,
        operation: &str,
        apply: impl FnOnce(&mut Registry) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let run = || -> Result<T, CoreError> {
            let _guard = self.lock()?;
            let mut registry = self.load()?;
            let outcome = apply(&mut registry)?;
            if registry.is_dirty() {
                self.write_snapshot(registry.jobs())?;
                debug!(operation, jobs = registry.len(), "job registry flushed");
            }
            Ok(outcome)
        };
        run().inspect_err(|err| {
            error!(
                operation,
                path = %self.path().display(),
                error = %err,
                "registry mutation failed"
            )
        })
    }

    /// Rebuilds the per-employee payroll checker jobs from `source`, keeping every
    /// other entry verbatim and in order, then saves the merged registry.
    pub fn reconcile(
        &self,
        source: &dyn PayrollSource,
        checker: &PayrollChecker,
    ) -> Result<Registry, CoreError> {
        self.reconcile_with(source, checker, |_| Ok(()))
    }

    /// [`JsonJobRegistry::reconcile`], running `on_merged` against the merged
    /// registry while the lock is still held. An error from `on_merged` leaves
    /// the file untouched.
    pub fn reconcile_with(
        &self,
        source: &dyn PayrollSource,
        checker: &PayrollChecker,
        on_merged: impl FnOnce(&Registry) -> Result<(), CoreError>,
    ) -> Result<Registry, CoreError> {
        let employees = source.employees().inspect_err(|err| {
            error!(error = %err, "failed to list employees for payroll reconciliation")
        })?;
        self.mutate("reconcile", |registry| {
            let dropped = registry.retain(|job| !job.is_payroll_checker());
            let kept = registry.len();
            for employee in &employees {
                registry.upsert(JobDefinition::payroll_checker(
                    &employee.employee_id,
                    &checker.cron,
                    checker.script_path.clone(),
                ));
            }
            registry.mark_dirty();
            info!(
                kept,
                dropped,
                payroll_checkers = registry.len() - kept,
                "reconciled payroll checker jobs"
            );
            on_merged(registry)?;
            Ok(registry.clone())
        })
    }

    /// Replaces the file via a uniquely named sibling and a rename, so readers
    /// only ever see a complete snapshot.
    fn write_snapshot(&self, jobs: &[JobDefinition]) -> Result<(), CoreError> {
        let path = self.path();
        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = with_appended_extension(path, &format!("{}.{}", Uuid::new_v4(), TMP_SUFFIX));
        let result = write_file(&tmp, &json).and_then(|()| fs::rename(&tmp, path));
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp);
            error!(path = %path.display(), error = %err, "failed to write job registry");
            return Err(CoreError::persistence_at(path, err));
        }
        Ok(())
    }
}

fn with_appended_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, suffix),
        None => suffix.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_file(path: &Path, data: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(())
}
