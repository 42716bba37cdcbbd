//! Wires a [`Config`] into the job registry, the live scheduler, and the
//! lifecycle manager.

use std::{env, path::PathBuf, sync::Arc};

use cadence_config::{BackendKind, Config, ConfigManager};
use cadence_core::{HorizonSearch, ObligationStore, PayrollSource};
use cadence_scheduler::{CronLifecycleManager, CrontabBackend, InProcessScheduler, RegistryBackend};
use cadence_storage_json::{JsonJobRegistry, PayrollChecker, RegistryPaths};
use tracing::info;

use crate::errors::AppError;

/// Overrides the directory holding `config/config.json` and, unless the config
/// says otherwise, the data root.
pub const HOME_ENV: &str = "CADENCE_HOME";

pub struct App {
    config: Config,
    registry: JsonJobRegistry,
    scheduler: Arc<InProcessScheduler>,
    lifecycle: CronLifecycleManager,
}

impl App {
    pub fn load_config() -> Result<Config, AppError> {
        let base = env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| Config::default().resolve_data_root());
        let manager = ConfigManager::with_base_dir(base.clone())?;
        let mut config = manager.load()?;
        if config.data_root.is_none() {
            config.data_root = Some(base);
        }
        Ok(config)
    }

    pub fn registry_for(config: &Config) -> JsonJobRegistry {
        JsonJobRegistry::new(RegistryPaths {
            registry_file: config.resolve_registry_file(),
            lock_file: config.resolve_registry_lock_file(),
        })
        .with_lock_timeout(config.lock_timeout())
        .with_stale_lock_after(config.stale_lock_after())
    }

    /// Builds the configured backend. The in-process backend re-registers every
    /// persisted job before returning.
    pub fn from_config(config: Config, store: Arc<dyn ObligationStore>) -> Result<Self, AppError> {
        let registry = Self::registry_for(&config);
        let scheduler = Arc::new(InProcessScheduler::default());
        let scripts_dir = config.resolve_scripts_dir();
        let lifecycle = match config.backend {
            BackendKind::InProcess => {
                let backend = RegistryBackend::new(scheduler.clone(), registry.clone())
                    .with_legacy_pruning(config.prune_legacy_payroll_checker);
                backend.restore()?;
                CronLifecycleManager::new(backend, store, scripts_dir)
            }
            BackendKind::Crontab => {
                let backend = CrontabBackend::system(
                    config.resolve_crontab_lock_file(),
                    config.worker_command.clone(),
                )
                .with_lock_timeout(config.lock_timeout())
                .with_stale_lock_after(config.stale_lock_after());
                CronLifecycleManager::new(backend, store, scripts_dir)
            }
        };
        info!(backend = %config.backend, "cadence app ready");
        Ok(Self {
            config,
            registry,
            scheduler,
            lifecycle,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &JsonJobRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<InProcessScheduler> {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> &CronLifecycleManager {
        &self.lifecycle
    }

    pub fn horizon(&self) -> HorizonSearch {
        HorizonSearch::new(self.config.horizon_max_years)
    }

    /// Rebuilds the payroll checker jobs from `source` on the configured
    /// backend. Returns the checker count.
    pub fn reconcile_payroll(&self, source: &dyn PayrollSource) -> Result<usize, AppError> {
        let checker = PayrollChecker {
            cron: self.config.payroll_checker_cron.clone(),
            script_path: self.config.resolve_payroll_checker_script(),
        };
        Ok(self.lifecycle.sync_payroll_checkers(source, &checker)?)
    }
}
