//! Activation strategies: where an active job lives.

use std::sync::Arc;

use cadence_core::{CoreError, PayrollSource};
use cadence_domain::JobDefinition;
use cadence_storage_json::{JsonJobRegistry, PayrollChecker};
use tracing::{error, info, warn};

use crate::scheduler::Scheduler;

/// Activation and deactivation of a job under its unique name.
pub trait JobBackend: Send + Sync {
    fn activate(&self, job: &JobDefinition) -> Result<(), CoreError>;

    /// Returns `false` when nothing with `unique_id` was active.
    fn deactivate(&self, unique_id: &str) -> Result<bool, CoreError>;

    /// Replaces every per-employee payroll checker with one per employee in
    /// `source`, leaving other jobs alone. Returns how many checkers are active.
    fn sync_payroll_checkers(
        &self,
        source: &dyn PayrollSource,
        checker: &PayrollChecker,
    ) -> Result<usize, CoreError>;
}

/// Live scheduler backed by the JSON registry, which survives restarts.
pub struct RegistryBackend {
    scheduler: Arc<dyn Scheduler>,
    registry: JsonJobRegistry,
    prune_legacy: bool,
}

impl RegistryBackend {
    pub fn new(scheduler: Arc<dyn Scheduler>, registry: JsonJobRegistry) -> Self {
        Self {
            scheduler,
            registry,
            prune_legacy: true,
        }
    }

    /// Whether deletions also drop the old single `payroll-checker` entry.
    pub fn with_legacy_pruning(mut self, prune_legacy: bool) -> Self {
        self.prune_legacy = prune_legacy;
        self
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &JsonJobRegistry {
        &self.registry
    }

    /// Registers every persisted job with the live scheduler. Returns how many
    /// were restored.
    pub fn restore(&self) -> Result<usize, CoreError> {
        let registry = self.registry.load()?;
        for job in registry.jobs() {
            self.scheduler.register(job)?;
        }
        info!(jobs = registry.len(), "restored jobs from registry");
        Ok(registry.len())
    }
}

impl JobBackend for RegistryBackend {
    fn activate(&self, job: &JobDefinition) -> Result<(), CoreError> {
        let persisted = self.registry.mutate("activate", |registry| {
            self.scheduler.register(job)?;
            registry.upsert(job.clone());
            Ok(())
        });
        if let Err(err) = persisted {
            if let Err(rollback) = self.scheduler.unregister(&job.name) {
                error!(job = %job.name, error = %rollback, "failed to roll back registration");
            }
            return Err(err);
        }
        Ok(())
    }

    fn deactivate(&self, unique_id: &str) -> Result<bool, CoreError> {
        let prune_legacy = self.prune_legacy;
        self.registry.mutate("deactivate", |registry| {
            let live = self.scheduler.contains(unique_id)?;
            let removed = registry.remove(unique_id).is_some();
            if !live && !removed {
                return Ok(false);
            }
            if prune_legacy {
                let pruned = registry.retain(|job| !job.is_legacy_payroll_checker());
                if pruned > 0 {
                    info!(pruned, "dropped legacy payroll checker entry");
                }
            }
            if live && !self.scheduler.unregister(unique_id)? {
                warn!(job = unique_id, "job left the live scheduler concurrently");
            }
            Ok(true)
        })
    }

    fn sync_payroll_checkers(
        &self,
        source: &dyn PayrollSource,
        checker: &PayrollChecker,
    ) -> Result<usize, CoreError> {
        let mut active = 0;
        self.registry.reconcile_with(source, checker, |merged| {
            for job in self.scheduler.list()? {
                if job.is_payroll_checker() && !merged.contains(&job.name) {
                    self.scheduler.unregister(&job.name)?;
                }
            }
            for job in merged.jobs().iter().filter(|job| job.is_payroll_checker()) {
                self.scheduler.register(job)?;
                active += 1;
            }
            Ok(())
        })?;
        Ok(active)
    }
}
