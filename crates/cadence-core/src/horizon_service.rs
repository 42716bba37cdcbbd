//! Day-by-day search for the first date each wishlist target becomes affordable.

use chrono::NaiveDate;
use tracing::debug;

use cadence_domain::{DateWindow, LedgerEntry};

use crate::{calendar::add_years, projection_service::LedgerProjector, CoreError};

pub const DEFAULT_MAX_HORIZON_YEARS: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct WishlistTarget {
    pub id: String,
    pub amount: f64,
}

impl WishlistTarget {
    pub fn new(id: impl Into<String>, amount: f64) -> Self {
        Self {
            id: id.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordability {
    On(NaiveDate),
    NoDateFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HorizonResult {
    pub target_id: String,
    pub amount: f64,
    pub affordability: Affordability,
}

/// Projection of a single day given that day's opening balance.
pub trait DayProjection {
    fn project_day(&self, day: NaiveDate, opening_balance: f64)
        -> Result<Vec<LedgerEntry>, CoreError>;
}

impl<F> DayProjection for F
where
    F: Fn(NaiveDate, f64) -> Result<Vec<LedgerEntry>, CoreError>,
{
    fn project_day(
        &self,
        day: NaiveDate,
        opening_balance: f64,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        self(day, opening_balance)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HorizonSearch {
    max_years: u32,
}

impl Default for HorizonSearch {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HORIZON_YEARS)
    }
}

impl HorizonSearch {
    pub fn new(max_years: u32) -> Self {
        Self {
            max_years: max_years.max(1),
        }
    }

    /// Last day the search may visit: `min(to, from + max_years)`.
    pub fn limit(&self, window: DateWindow) -> NaiveDate {
        let years = i32::try_from(self.max_years).unwrap_or(i32::MAX);
        let cap = add_years(window.from, years).unwrap_or(window.to);
        cap.min(window.to)
    }

    /// Walks one day at a time from `from`, carrying each day's closing balance
    /// into the next, and records the first day each target's amount is covered.
    /// Targets never covered come back as [`Affordability::NoDateFound`].
    pub fn search<P: DayProjection + ?Sized>(
        &self,
        pipeline: &P,
        from: NaiveDate,
        to: NaiveDate,
        starting_balance: f64,
        targets: &[WishlistTarget],
    ) -> Result<Vec<HorizonResult>, CoreError> {
        let window = DateWindow::new(from, to)?;
        if let Some(bad) = targets.iter().find(|target| !target.amount.is_finite()) {
            return Err(CoreError::Validation(format!(
                "wishlist target `{}` has a non-finite amount",
                bad.id
            )));
        }

        let mut results: Vec<HorizonResult> = targets
            .iter()
            .map(|target| HorizonResult {
                target_id: target.id.clone(),
                amount: target.amount,
                affordability: Affordability::NoDateFound,
            })
            .collect();
        let mut pending = results.len();
        let limit = self.limit(window);
        let mut cursor = Some(window.from);
        let mut balance = starting_balance;

        while let Some(day) = cursor.filter(|day| *day <= limit) {
            if pending == 0 {
                break;
            }
            let projected = pipeline.project_day(day, balance)?;
            balance = LedgerProjector::closing_balance(balance, &projected);
            for result in results
                .iter_mut()
                .filter(|result| result.affordability == Affordability::NoDateFound)
            {
                if balance >= result.amount {
                    debug!(
                        target_id = %result.target_id,
                        %day,
                        balance,
                        "wishlist target affordable"
                    );
                    result.affordability = Affordability::On(day);
                    pending -= 1;
                }
            }
            cursor = day.succ_opt();
        }

        Ok(results)
    }
}
