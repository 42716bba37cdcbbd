//! Jobs kept as lines of the user's OS crontab, one per unique id:
//! `<cron> <worker command> <script path> # <unique id>`.

use std::{
    env,
    ffi::{OsStr, OsString},
    io::{self, Write},
    path::PathBuf,
    process::Command,
    time::Duration,
};

use cadence_core::{CoreError, PayrollSource};
use cadence_domain::{JobDefinition, PAYROLL_CHECKER_PREFIX};
use cadence_storage_json::{
    MutationLock, PayrollChecker, DEFAULT_LOCK_TIMEOUT, DEFAULT_STALE_AFTER,
};
use tracing::{debug, error, info};

use crate::backend::JobBackend;

const CRONTAB: &str = "crontab";
const NO_CRONTAB: &str = "no crontab for";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program to completion.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&OsStr]) -> io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&OsStr]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub struct CrontabBackend<R: CommandRunner = SystemCommandRunner> {
    runner: R,
    lock_path: PathBuf,
    lock_timeout: Duration,
    stale_lock_after: Duration,
    worker_command: String,
    staging_dir: PathBuf,
}

impl CrontabBackend<SystemCommandRunner> {
    pub fn system(lock_path: PathBuf, worker_command: impl Into<String>) -> Self {
        Self::new(SystemCommandRunner, lock_path, worker_command)
    }
}

impl<R: CommandRunner> CrontabBackend<R> {
    pub fn new(runner: R, lock_path: PathBuf, worker_command: impl Into<String>) -> Self {
        Self {
            runner,
            lock_path,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_after: DEFAULT_STALE_AFTER,
            worker_command: worker_command.into(),
            staging_dir: env::temp_dir(),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Directory for the temporary files handed to `crontab <file>`.
    pub fn with_stale_lock_after(mut self, stale_lock_after: Duration) -> Self {
        self.stale_lock_after = stale_lock_after;
        self
    }

    pub fn with_staging_dir(mut self, staging_dir: PathBuf) -> Self {
        self.staging_dir = staging_dir;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn entry_line(&self, job: &JobDefinition) -> String {
        format!(
            "{} {} {} # {}",
            job.cron,
            self.worker_command,
            job.script_path.display(),
            job.name
        )
    }

    /// Current crontab lines. A user without a crontab has none.
    pub fn current_lines(&self) -> Result<Vec<String>, CoreError> {
        let output = self.run(&[OsStr::new("-l")])?;
        if output.success {
            return Ok(output.stdout.lines().map(str::to_string).collect());
        }
        if output.stderr.contains(NO_CRONTAB) {
            debug!("no crontab installed yet");
            return Ok(Vec::new());
        }
        Err(exit_error("crontab -l", &output))
    }

    fn install(&self, lines: &[String]) -> Result<(), CoreError> {
        let mut staged = tempfile::Builder::new()
            .prefix("cadence-crontab-")
            .suffix(".txt")
            .tempfile_in(&self.staging_dir)
            .map_err(|err| CoreError::persistence_at(&self.staging_dir, err))?;
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        staged
            .write_all(content.as_bytes())
            .and_then(|()| staged.flush())
            .map_err(|err| CoreError::persistence_at(staged.path(), err))?;
        let path: OsString = staged.path().as_os_str().to_owned();
        let output = self.run(&[path.as_os_str()])?;
        if !output.success {
            return Err(exit_error("crontab <file>", &output));
        }
        Ok(())
    }

    fn run(&self, args: &[&OsStr]) -> Result<CommandOutput, CoreError> {
        self.runner
            .run(CRONTAB, args)
            .map_err(|err| CoreError::ExternalProcess(format!("failed to run crontab: {err}")))
    }

    fn lock(&self) -> Result<MutationLock, CoreError> {
        MutationLock::acquire_with(&self.lock_path, self.lock_timeout, self.stale_lock_after)
    }
}

impl<R: CommandRunner> JobBackend for CrontabBackend<R> {
    fn activate(&self, job: &JobDefinition) -> Result<(), CoreError> {
        let run = || -> Result<(), CoreError> {
            let _guard = self.lock()?;
            let mut lines = self.current_lines()?;
            lines.retain(|line| !line.contains(job.name.as_str()));
            lines.push(self.entry_line(job));
            self.install(&lines)
        };
        run().inspect_err(|err| {
            error!(operation = "activate", job = %job.name, error = %err, "crontab update failed")
        })?;
        info!(job = %job.name, cron = %job.cron, "crontab entry installed");
        Ok(())
    }

    fn deactivate(&self, unique_id: &str) -> Result<bool, CoreError> {
        let run = || -> Result<bool, CoreError> {
            let _guard = self.lock()?;
            let mut lines = self.current_lines()?;
            let before = lines.len();
            lines.retain(|line| !line.contains(unique_id));
            if lines.len() == before {
                return Ok(false);
            }
            self.install(&lines)?;
            Ok(true)
        };
        let removed = run().inspect_err(|err| {
            error!(operation = "deactivate", job = unique_id, error = %err, "crontab update failed")
        })?;
        if removed {
            info!(job = unique_id, "crontab entry removed");
        }
        Ok(removed)
    }

    fn sync_payroll_checkers(
        &self,
        source: &dyn PayrollSource,
        checker: &PayrollChecker,
    ) -> Result<usize, CoreError> {
        let employees = source.employees()?;
        let marker = format!("# {PAYROLL_CHECKER_PREFIX}");
        let run = || -> Result<(), CoreError> {
            let _guard = self.lock()?;
            let mut lines = self.current_lines()?;
            lines.retain(|line| !line.contains(marker.as_str()));
            for employee in &employees {
                let job = JobDefinition::payroll_checker(
                    &employee.employee_id,
                    &checker.cron,
                    checker.script_path.clone(),
                );
                lines.push(self.entry_line(&job));
            }
            self.install(&lines)
        };
        run().inspect_err(|err| {
            error!(operation = "sync_payroll_checkers", error = %err, "crontab update failed")
        })?;
        info!(payroll_checkers = employees.len(), "crontab payroll checkers synced");
        Ok(employees.len())
    }
}

fn exit_error(command: &str, output: &CommandOutput) -> CoreError {
    let code = output
        .code
        .map_or_else(|| "signal".to_string(), |code| code.to_string());
    CoreError::ExternalProcess(format!(
        "{command} exited with {code}: {}",
        output.stderr.trim()
    ))
}
