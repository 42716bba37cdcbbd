//! Forecasting helpers that combine recurring obligations with ledger data.

use chrono::NaiveDate;
use tracing::{debug, warn};

use cadence_domain::{DateWindow, LedgerEntry, Obligation};

use crate::{
    horizon_service::{HorizonResult, HorizonSearch, WishlistTarget},
    projection_service::{LedgerProjector, ProjectionSummary},
    recurrence_service::RecurrenceExpander,
    sources::{BalanceSource, ObligationSource, RealizedEntrySource},
    CoreError,
};

#[derive(Debug, Clone)]
pub struct AccountForecast {
    pub account_id: String,
    pub window: DateWindow,
    pub entries: Vec<LedgerEntry>,
    pub summary: ProjectionSummary,
}

pub struct ForecastService;

impl ForecastService {
    /// Realized entries plus projected occurrences for an account, annotated
    /// with running balances starting from the account's current balance.
    pub fn account_forecast(
        account_id: &str,
        window: DateWindow,
        balances: &dyn BalanceSource,
        realized: &dyn RealizedEntrySource,
        obligations: &dyn ObligationSource,
    ) -> Result<AccountForecast, CoreError> {
        let run = || -> Result<AccountForecast, CoreError> {
            let opening = balances.current_balance(account_id)?;
            let mut entries = realized.realized_entries(account_id, window)?;
            let obligations = obligations.obligations(account_id)?;
            let occurrences = RecurrenceExpander::expand_all(&obligations, window)?;
            debug!(
                account_id,
                realized = entries.len(),
                projected = occurrences.len(),
                "assembling account forecast"
            );
            entries.extend(occurrences.into_iter().map(LedgerEntry::from));
            let entries = LedgerProjector::project(opening, entries)?;
            let summary = LedgerProjector::summarize(opening, &entries);
            Ok(AccountForecast {
                account_id: account_id.to_string(),
                window,
                entries,
                summary,
            })
        };
        run().inspect_err(|err| warn!(account_id, error = %err, "account forecast failed"))
    }

    /// The single-day projection pipeline fed to [`HorizonSearch`].
    pub fn day_pipeline(
        obligations: &[Obligation],
    ) -> impl Fn(NaiveDate, f64) -> Result<Vec<LedgerEntry>, CoreError> + '_ {
        move |day, opening| {
            let occurrences =
                RecurrenceExpander::expand_all(obligations, DateWindow::single_day(day))?;
            LedgerProjector::project(
                opening,
                occurrences.into_iter().map(LedgerEntry::from).collect(),
            )
        }
    }

    /// First affordable date for each wishlist target given the account's
    /// current balance and recurring obligations.
    pub fn wishlist_horizon(
        account_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        targets: &[WishlistTarget],
        search: &HorizonSearch,
        balances: &dyn BalanceSource,
        obligations: &dyn ObligationSource,
    ) -> Result<Vec<HorizonResult>, CoreError> {
        let run = || -> Result<Vec<HorizonResult>, CoreError> {
            let opening = balances.current_balance(account_id)?;
            let obligations = obligations.obligations(account_id)?;
            let pipeline = Self::day_pipeline(&obligations);
            search.search(&pipeline, from, to, opening, targets)
        };
        run().inspect_err(|err| warn!(account_id, error = %err, "wishlist horizon search failed"))
    }
}
