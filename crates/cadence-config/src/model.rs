use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

const APP_DIR: &str = "cadence";

/// Runtime configuration. Relative paths resolve against the data root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Defaults to `<platform data dir>/cadence`.
    pub data_root: Option<PathBuf>,
    pub registry_file: PathBuf,
    pub scripts_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Defaults to the registry file with a `.lock` extension appended.
    pub registry_lock_file: Option<PathBuf>,
    pub crontab_lock_file: PathBuf,
    pub lock_timeout_ms: u64,
    /// Lock files older than this are broken even if their holder still runs.
    pub stale_lock_ms: u64,
    pub backend: BackendKind,
    pub worker_command: String,
    pub payroll_checker_script: PathBuf,
    pub payroll_checker_cron: String,
    pub prune_legacy_payroll_checker: bool,
    pub horizon_max_years: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: None,
            registry_file: PathBuf::from("jobs.json"),
            scripts_dir: PathBuf::from("jobs"),
            registry_lock_file: None,
            crontab_lock_file: PathBuf::from("crontab.lock"),
            lock_timeout_ms: 5_000,
            stale_lock_ms: 300_000,
            backend: BackendKind::default(),
            worker_command: "node".into(),
            payroll_checker_script: PathBuf::from("jobs/payroll-checker.js"),
            payroll_checker_cron: "0 0 1 */1 *".into(),
            prune_legacy_payroll_checker: true,
            horizon_max_years: 10,
        }
    }
}

impl Config {
    pub fn resolve_data_root(&self) -> PathBuf {
        if let Some(path) = &self.data_root {
            return path.clone();
        }

        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        base.join(APP_DIR)
    }

    pub fn resolve_registry_file(&self) -> PathBuf {
        self.resolve(&self.registry_file)
    }

    pub fn resolve_registry_lock_file(&self) -> PathBuf {
        match &self.registry_lock_file {
            Some(path) => self.resolve(path),
            None => {
                let mut lock = self.resolve_registry_file().into_os_string();
                lock.push(".lock");
                PathBuf::from(lock)
            }
        }
    }

    pub fn resolve_scripts_dir(&self) -> PathBuf {
        self.resolve(&self.scripts_dir)
    }

    pub fn resolve_crontab_lock_file(&self) -> PathBuf {
        self.resolve(&self.crontab_lock_file)
    }

    pub fn resolve_payroll_checker_script(&self) -> PathBuf {
        self.resolve(&self.payroll_checker_script)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn stale_lock_after(&self) -> Duration {
        Duration::from_millis(self.stale_lock_ms)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.resolve_data_root().join(path)
        }
    }
}

/// Where active jobs live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process scheduler plus the JSON registry.
    #[default]
    InProcess,
    /// Lines of the user's OS crontab.
    Crontab,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendKind::InProcess => "in_process",
            BackendKind::Crontab => "crontab",
        };
        f.write_str(label)
    }
}
