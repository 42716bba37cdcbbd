//! Scheduled job definitions as persisted in the job registry.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name prefix of the per-employee payroll checker jobs.
pub const PAYROLL_CHECKER_PREFIX: &str = "payroll-checker-employee-";

/// Name of the single payroll checker job used before per-employee jobs existed.
pub const LEGACY_PAYROLL_CHECKER: &str = "payroll-checker";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Data handed to a worker script when its job fires.
pub struct WorkerPayload {
    #[serde(rename = "workerData")]
    pub worker_data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One entry of the job registry: `{name, cron, path, worker?}`.
pub struct JobDefinition {
    pub name: String,
    pub cron: String,
    #[serde(rename = "path")]
    pub script_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerPayload>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, cron: impl Into<String>, script_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            cron: cron.into(),
            script_path,
            worker: None,
        }
    }

    pub fn with_worker_data(mut self, worker_data: Value) -> Self {
        self.worker = Some(WorkerPayload { worker_data });
        self
    }

    pub fn payroll_checker(employee_id: &str, cron: &str, script_path: PathBuf) -> Self {
        Self::new(Self::payroll_checker_name(employee_id), cron, script_path)
            .with_worker_data(json!({ "employee_id": employee_id }))
    }

    pub fn payroll_checker_name(employee_id: &str) -> String {
        format!("{PAYROLL_CHECKER_PREFIX}{employee_id}")
    }

    pub fn is_payroll_checker(&self) -> bool {
        self.name.starts_with(PAYROLL_CHECKER_PREFIX)
    }

    pub fn is_legacy_payroll_checker(&self) -> bool {
        self.name == LEGACY_PAYROLL_CHECKER
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Lifecycle of a job: `Pending -> Active -> Deleted`.
pub enum JobState {
    Pending,
    Active,
    Deleted,
}

impl JobState {
    /// Validates and performs a lifecycle transition.
    pub fn transition(self, next: JobState) -> Result<JobState, JobStateError> {
        match (self, next) {
            (JobState::Pending, JobState::Active) | (JobState::Active, JobState::Deleted) => {
                Ok(next)
            }
            (from, to) => Err(JobStateError { from, to }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Deleted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Pending => "Pending",
            JobState::Active => "Active",
            JobState::Deleted => "Deleted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Raised when a job is asked to move between states that are not adjacent.
pub struct JobStateError {
    pub from: JobState,
    pub to: JobState,
}

impl fmt::Display for JobStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job cannot move from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for JobStateError {}
