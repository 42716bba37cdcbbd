//! Running-balance projection over realized and projected ledger entries.

use cadence_domain::LedgerEntry;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// Totals of the projected (not yet realized) movements in a projection.
pub struct ProjectionSummary {
    pub opening_balance: f64,
    pub inflow: f64,
    pub outflow: f64,
    pub net: f64,
    pub closing_balance: f64,
}

pub struct LedgerProjector;

impl LedgerProjector {
    /// Sorts entries by date (ties keep input order) and annotates each with the
    /// running balance. Realized entries report the balance accumulated before
    /// them without adding their own amount, which `starting_balance` already holds.
    pub fn project(
        starting_balance: f64,
        mut entries: Vec<LedgerEntry>,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        if !starting_balance.is_finite() {
            return Err(CoreError::Validation(
                "starting balance must be a finite number".into(),
            ));
        }
        if let Some(bad) = entries.iter().find(|entry| !entry.amount.is_finite()) {
            return Err(CoreError::Validation(format!(
                "ledger entry dated {} has a non-finite amount",
                bad.date
            )));
        }

        entries.sort_by_key(|entry| entry.date);
        let mut running = starting_balance;
        for entry in entries.iter_mut() {
            if !entry.is_realized() {
                running += entry.amount;
            }
            entry.balance = Some(running);
        }
        Ok(entries)
    }

    /// Balance after the last entry, or the opening balance when nothing moved.
    pub fn closing_balance(opening_balance: f64, projected: &[LedgerEntry]) -> f64 {
        projected
            .last()
            .and_then(|entry| entry.balance)
            .unwrap_or(opening_balance)
    }

    pub fn summarize(opening_balance: f64, projected: &[LedgerEntry]) -> ProjectionSummary {
        let mut summary = ProjectionSummary {
            opening_balance,
            ..ProjectionSummary::default()
        };
        for entry in projected.iter().filter(|entry| !entry.is_realized()) {
            if entry.amount >= 0.0 {
                summary.inflow += entry.amount;
            } else {
                summary.outflow += entry.amount.abs();
            }
        }
        summary.net = summary.inflow - summary.outflow;
        summary.closing_balance = Self::closing_balance(opening_balance, projected);
        summary
    }
}
