//! Narrow read-only contracts onto the relational store and CRUD layer.
//! Implementations live outside this crate; tests use in-memory fakes.

use cadence_domain::{DateWindow, LedgerEntry, Obligation};

use crate::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRecord {
    pub employee_id: String,
}

impl EmployeeRecord {
    pub fn new(employee_id: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
        }
    }
}

/// Yields the employees whose payroll must be checked every month.
pub trait PayrollSource {
    fn employees(&self) -> Result<Vec<EmployeeRecord>, CoreError>;
}

/// Balance of an account as of now, including every realized entry.
pub trait BalanceSource {
    fn current_balance(&self, account_id: &str) -> Result<f64, CoreError>;
}

/// Entries already posted against an account within a window.
pub trait RealizedEntrySource {
    fn realized_entries(
        &self,
        account_id: &str,
        window: DateWindow,
    ) -> Result<Vec<LedgerEntry>, CoreError>;
}

/// Recurring obligations touching an account, transfers already split into legs.
pub trait ObligationSource {
    fn obligations(&self, account_id: &str) -> Result<Vec<Obligation>, CoreError>;
}

/// Maps the CRUD layer's job id onto the scheduler's unique job name.
pub trait ObligationStore: Send + Sync {
    fn unique_id_for(&self, job_id: &str) -> Result<Option<String>, CoreError>;
}
